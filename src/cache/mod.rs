//! A set-associative cache model with LRU replacement and dirty-byte
//! accounting.
//!
//! The cache is a two-dimensional table of lines: `2^s` sets of `E`
//! ways each. An access decodes its address into a tag and a set index,
//! then runs one of three paths: hit, cold miss into an invalid way, or
//! eviction of the least recently used way. Writes follow write-allocate/
//! write-back semantics: a line turns dirty on the first write and stays
//! dirty until it is evicted, with [`Counters`] tracking the dirty bytes
//! currently resident and the dirty bytes written back on eviction.
//!
//! Recency is kept in per-line age stamps: every line starts at `-1`
//! ("never touched"), a touched line resets to `0`, and [`Cache::tick`]
//! ages every valid line by one after each trace record. Lower stamp means
//! more recent, so the LRU victim is the valid line with the largest
//! stamp (lowest index on ties). A hit that lands on the set's most
//! recently used line counts as a double reference.

pub mod trace;

use core::fmt;

/// An invalid cache geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Set-index and block-offset bits must leave room for a tag in a
    /// 64-bit address.
    #[error("set index bits plus block bits must be at most 63")]
    TooManyAddressBits,
    /// A cache needs at least one way per set.
    #[error("associativity must be at least 1")]
    ZeroAssociativity,
}

/// Cache geometry: `(s, E, b)`. Immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    set_bits: u32,
    assoc: usize,
    block_bits: u32,
}

impl Config {
    pub fn new(set_bits: u32, assoc: usize, block_bits: u32) -> Result<Self, ConfigError> {
        if set_bits + block_bits > 63 {
            return Err(ConfigError::TooManyAddressBits);
        }
        if assoc == 0 {
            return Err(ConfigError::ZeroAssociativity);
        }
        Ok(Self {
            set_bits,
            assoc,
            block_bits,
        })
    }

    /// Number of sets, `S = 2^s`.
    pub fn sets(&self) -> usize {
        1 << self.set_bits
    }

    /// Ways per set.
    pub fn assoc(&self) -> usize {
        self.assoc
    }

    /// Block size in bytes, `B = 2^b`.
    pub fn block_size(&self) -> usize {
        1 << self.block_bits
    }

    fn set_index(&self, addr: u64) -> usize {
        ((addr >> self.block_bits) & (self.sets() as u64 - 1)) as usize
    }

    fn tag(&self, addr: u64) -> u64 {
        addr >> (self.set_bits + self.block_bits)
    }
}

/// One cache line.
#[derive(Debug, Clone)]
struct Line {
    valid: bool,
    dirty: bool,
    tag: u64,
    /// Age stamp: `-1` means never touched, otherwise the number of ticks
    /// since the last access. Stays in lockstep with `valid`.
    stamp: i64,
}

impl Line {
    fn new() -> Self {
        Self {
            valid: false,
            dirty: false,
            tag: 0,
            stamp: -1,
        }
    }
}

/// The kind of one memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// What a single access did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The tag was resident. `double_ref` is set when the hit landed on
    /// the set's most recently used line.
    Hit { double_ref: bool },
    /// The tag was not resident. `write` distinguishes the dirty-miss
    /// variant; `eviction` carries the victim's dirty status when a valid
    /// line had to make room, and is `None` on a cold miss.
    Miss {
        write: bool,
        eviction: Option<bool>,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Outcome::Hit { double_ref: false } => f.write_str("hit"),
            Outcome::Hit { double_ref: true } => f.write_str("hit-double_ref"),
            Outcome::Miss { write, eviction } => {
                f.write_str(if write { "dirty-miss" } else { "miss" })?;
                match eviction {
                    None => Ok(()),
                    Some(false) => f.write_str(" eviction"),
                    Some(true) => f.write_str(" dirty_eviction"),
                }
            }
        }
    }
}

/// The six summary accumulators.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub dirty_evicted_bytes: u64,
    pub dirty_active_bytes: u64,
    pub double_refs: u64,
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits:{} misses:{} evictions:{} dirty_evicted:{} dirty_active:{} double_refs:{}",
            self.hits,
            self.misses,
            self.evictions,
            self.dirty_evicted_bytes,
            self.dirty_active_bytes,
            self.double_refs,
        )
    }
}

/// The simulated cache: the line table plus the counters.
pub struct Cache {
    config: Config,
    sets: Vec<Vec<Line>>,
    counters: Counters,
}

impl Cache {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sets: vec![vec![Line::new(); config.assoc()]; config.sets()],
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Apply one memory access.
    ///
    /// Does not age the lines; call [`tick`](Self::tick) once per trace
    /// record after its accesses.
    pub fn access(&mut self, addr: u64, kind: AccessKind) -> Outcome {
        let block_bytes = self.config.block_size() as u64;
        let set = self.config.set_index(addr);
        let tag = self.config.tag(addr);
        let write = kind == AccessKind::Write;
        let lines = &mut self.sets[set];

        // hit path
        if let Some(i) = lines.iter().position(|l| l.valid && l.tag == tag) {
            if write && !lines[i].dirty {
                lines[i].dirty = true;
                self.counters.dirty_active_bytes += block_bytes;
            }
            // the most recently used line is the valid one with the
            // smallest stamp, first such index on ties
            let mru = lines
                .iter()
                .enumerate()
                .filter(|(_, l)| l.valid)
                .min_by_key(|(_, l)| l.stamp)
                .map(|(j, _)| j);
            let double_ref = mru == Some(i);
            if double_ref {
                self.counters.double_refs += 1;
            }
            lines[i].stamp = 0;
            self.counters.hits += 1;
            return Outcome::Hit { double_ref };
        }

        // cold miss into the first invalid way
        if let Some(i) = lines.iter().position(|l| !l.valid) {
            let line = &mut lines[i];
            if write {
                line.dirty = true;
                self.counters.dirty_active_bytes += block_bytes;
            }
            line.valid = true;
            line.tag = tag;
            line.stamp = 0;
            self.counters.misses += 1;
            return Outcome::Miss {
                write,
                eviction: None,
            };
        }

        // eviction: largest stamp wins, lowest index breaks ties
        let mut victim = 0;
        let mut max_stamp = i64::MIN;
        for (i, line) in lines.iter().enumerate() {
            if line.valid && line.stamp > max_stamp {
                max_stamp = line.stamp;
                victim = i;
            }
        }
        self.counters.evictions += 1;
        self.counters.misses += 1;

        let victim_dirty = lines[victim].dirty;
        if victim_dirty {
            self.counters.dirty_evicted_bytes += block_bytes;
            if !write {
                // the dirty block leaves and a clean one takes its place
                lines[victim].dirty = false;
                self.counters.dirty_active_bytes -= block_bytes;
            }
            // on a write the incoming block is dirty as well: the active
            // total is unchanged
        } else if write {
            lines[victim].dirty = true;
            self.counters.dirty_active_bytes += block_bytes;
        }
        lines[victim].tag = tag;
        lines[victim].stamp = 0;
        Outcome::Miss {
            write,
            eviction: Some(victim_dirty),
        }
    }

    /// Age every valid line by one tick.
    pub fn tick(&mut self) {
        for set in &mut self.sets {
            for line in set {
                if line.valid {
                    line.stamp += 1;
                }
            }
        }
    }

    /// Replay one trace record: its accesses in order, then one aging
    /// tick. Returns the outcome of each access (two for a modify, none
    /// for an instruction fetch).
    pub fn replay(&mut self, record: trace::Record) -> Vec<Outcome> {
        let outcomes = record
            .accesses()
            .iter()
            .map(|&kind| self.access(record.addr, kind))
            .collect();
        self.tick();
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::trace::Record;
    use super::{AccessKind, Cache, Config, ConfigError, Outcome};

    /// The geometry of the scenario tests: S=2, E=1, B=4.
    fn tiny() -> Cache {
        Cache::new(Config::new(1, 1, 2).unwrap())
    }

    fn replay(cache: &mut Cache, trace: &str) {
        for line in trace.lines() {
            if let Some(record) = Record::parse(line) {
                cache.replay(record);
            }
        }
    }

    #[test]
    fn config_validation() {
        assert_eq!(Config::new(32, 1, 32), Err(ConfigError::TooManyAddressBits));
        assert_eq!(Config::new(1, 0, 2), Err(ConfigError::ZeroAssociativity));
        let config = Config::new(4, 2, 4).unwrap();
        assert_eq!(config.sets(), 16);
        assert_eq!(config.block_size(), 16);
    }

    #[test]
    fn address_decode() {
        let config = Config::new(1, 1, 2).unwrap();
        assert_eq!(config.set_index(0x0), 0);
        assert_eq!(config.set_index(0x4), 1);
        assert_eq!(config.set_index(0x8), 0);
        assert_eq!(config.tag(0x8), 1);
        assert_eq!(config.tag(0x0), 0);
    }

    #[test]
    fn cold_read_miss() {
        let mut cache = tiny();
        replay(&mut cache, "L 0,1");
        let c = cache.counters();
        assert_eq!((c.hits, c.misses, c.dirty_active_bytes), (0, 1, 0));
    }

    #[test]
    fn repeated_read_is_a_double_ref() {
        let mut cache = tiny();
        replay(&mut cache, "L 0,1\nL 0,1");
        let c = cache.counters();
        assert_eq!((c.hits, c.misses, c.double_refs), (1, 1, 1));
    }

    #[test]
    fn write_miss_turns_the_line_dirty() {
        let mut cache = tiny();
        replay(&mut cache, "S 0,1");
        let c = cache.counters();
        assert_eq!((c.misses, c.dirty_active_bytes), (1, 4));
    }

    #[test]
    fn read_evicting_a_dirty_line_writes_it_back() {
        let mut cache = tiny();
        replay(&mut cache, "S 0,1\nL 8,1");
        let c = cache.counters();
        assert_eq!(c.misses, 2);
        assert_eq!(c.evictions, 1);
        assert_eq!(c.dirty_evicted_bytes, 4);
        assert_eq!(c.dirty_active_bytes, 0);
    }

    #[test]
    fn modify_is_a_read_then_a_write() {
        let mut cache = tiny();
        replay(&mut cache, "M 0,1");
        let c = cache.counters();
        assert_eq!((c.hits, c.misses, c.dirty_active_bytes), (1, 1, 4));
    }

    #[test]
    fn write_miss_evicting_a_clean_line() {
        let mut cache = tiny();
        // load makes the line clean, the conflicting store evicts it
        replay(&mut cache, "L 0,1\nS 8,1");
        let c = cache.counters();
        assert_eq!(c.evictions, 1);
        assert_eq!(c.dirty_evicted_bytes, 0);
        assert_eq!(c.dirty_active_bytes, 4);
    }

    #[test]
    fn write_miss_evicting_a_dirty_line_keeps_active_bytes() {
        let mut cache = tiny();
        replay(&mut cache, "S 0,1\nS 8,1");
        let c = cache.counters();
        assert_eq!(c.evictions, 1);
        assert_eq!(c.dirty_evicted_bytes, 4);
        assert_eq!(c.dirty_active_bytes, 4);
    }

    #[test]
    fn lru_victim_is_the_stalest_line() {
        // one set of two ways, 4-byte blocks
        let mut cache = Cache::new(Config::new(0, 2, 2).unwrap());
        replay(&mut cache, "L 0,1\nL 10,1\nL 0,1\nL 20,1");
        // the way holding 0x10 was stalest, so 0x20 replaced it and 0x0
        // survived
        assert_eq!(cache.counters().evictions, 1);
        assert_eq!(
            cache.access(0x0, AccessKind::Read),
            Outcome::Hit { double_ref: false }
        );
    }

    #[test]
    fn modify_write_half_double_refs_its_own_read() {
        // the write half of a modify hits the line its read half just
        // touched, which is by then the set's most recently used line
        let mut cache = tiny();
        replay(&mut cache, "M 0,1");
        assert_eq!(cache.counters().double_refs, 1);
    }

    #[test]
    fn dirty_active_matches_the_dirty_lines() {
        let mut cache = Cache::new(Config::new(2, 2, 3).unwrap());
        let trace = "S 0,1\nL 8,1\nS 10,1\nM 18,1\nS 0,1\nL 40,1\nS 8,1";
        for line in trace.lines() {
            if let Some(record) = Record::parse(line) {
                cache.replay(record);
            }
            let dirty_lines: u64 = cache
                .sets
                .iter()
                .flatten()
                .filter(|l| l.valid && l.dirty)
                .count() as u64;
            assert_eq!(
                cache.counters().dirty_active_bytes,
                dirty_lines * cache.config().block_size() as u64,
            );
        }
    }

    #[test]
    fn accounting_adds_up() {
        let mut cache = Cache::new(Config::new(1, 2, 2).unwrap());
        let trace = "L 0,1\nI 100,1\nM 4,2\nS 8,4\nM 0,8\nL 1c,1\nS 3c,1";
        let mut touches = 0;
        for line in trace.lines() {
            if let Some(record) = Record::parse(line) {
                touches += record.accesses().len() as u64;
                cache.replay(record);
            }
        }
        let c = cache.counters();
        assert_eq!(c.hits + c.misses, touches);
        assert!(c.evictions <= c.misses);
    }

    #[test]
    fn outcome_strings() {
        assert_eq!(Outcome::Hit { double_ref: false }.to_string(), "hit");
        assert_eq!(
            Outcome::Hit { double_ref: true }.to_string(),
            "hit-double_ref"
        );
        assert_eq!(
            Outcome::Miss {
                write: false,
                eviction: None,
            }
            .to_string(),
            "miss"
        );
        assert_eq!(
            Outcome::Miss {
                write: true,
                eviction: None,
            }
            .to_string(),
            "dirty-miss"
        );
        assert_eq!(
            Outcome::Miss {
                write: false,
                eviction: Some(true),
            }
            .to_string(),
            "miss dirty_eviction"
        );
        assert_eq!(
            Outcome::Miss {
                write: true,
                eviction: Some(false),
            }
            .to_string(),
            "dirty-miss eviction"
        );
    }

    #[test]
    fn summary_line() {
        let mut cache = tiny();
        replay(&mut cache, "S 0,1\nL 8,1");
        assert_eq!(
            cache.counters().to_string(),
            "hits:0 misses:2 evictions:1 dirty_evicted:4 dirty_active:0 double_refs:0",
        );
    }
}
