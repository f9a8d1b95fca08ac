//! End-to-end cache simulation scenarios.

use memkit::cache::{trace::Record, Cache, Config};

use std::io::{BufRead, BufReader, Write};

/// Replay a multi-line trace and return the outcome strings per record.
fn replay(cache: &mut Cache, trace: &str) -> Vec<String> {
    let mut rendered = Vec::new();
    for line in trace.lines() {
        let Some(record) = Record::parse(line) else {
            continue;
        };
        let outcomes = cache.replay(record);
        if !outcomes.is_empty() {
            rendered.push(
                outcomes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }
    }
    rendered
}

fn tiny() -> Cache {
    // S=2, E=1, B=4
    Cache::new(Config::new(1, 1, 2).unwrap())
}

#[test]
fn verbose_outcomes_match_the_trace() {
    let mut cache = tiny();
    let rendered = replay(&mut cache, "L 0,1\nL 0,1\nS 0,1\nL 8,1\nM 8,1");
    assert_eq!(
        rendered,
        [
            "miss",
            "hit-double_ref",
            "hit-double_ref",
            "miss dirty_eviction",
            "hit-double_ref hit-double_ref",
        ]
    );
}

#[test]
fn dirty_eviction_accounting() {
    let mut cache = tiny();
    replay(&mut cache, "S 0,1\nL 8,1");
    let c = cache.counters();
    assert_eq!(c.misses, 2);
    assert_eq!(c.evictions, 1);
    assert_eq!(c.dirty_evicted_bytes, 4);
    assert_eq!(c.dirty_active_bytes, 0);
}

#[test]
fn instruction_records_do_not_touch_the_cache() {
    let mut cache = tiny();
    replay(&mut cache, "I 400540,4\nI 400544,4\nL 0,1\nI 400548,4");
    let c = cache.counters();
    assert_eq!(c.hits + c.misses, 1);
}

#[test]
fn replay_from_a_trace_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "I 400540,4\n L 10,4\n S 18,4\n M 10,4\n").unwrap();

    let mut cache = Cache::new(Config::new(4, 1, 4).unwrap());
    let reader = BufReader::new(std::fs::File::open(file.path()).unwrap());
    for line in reader.lines() {
        if let Some(record) = Record::parse(&line.unwrap()) {
            cache.replay(record);
        }
    }
    let c = cache.counters();
    // 0x10 and 0x18 share one 16-byte block
    assert_eq!(c.misses, 1);
    assert_eq!(c.hits, 3);
    assert_eq!(c.dirty_active_bytes, 16);
}

#[test]
fn counters_add_up_over_a_generated_trace() {
    // a small cache under a scattered workload, to force plenty of
    // evictions
    let mut cache = Cache::new(Config::new(2, 2, 3).unwrap());
    let geometry_bytes =
        (cache.config().sets() * cache.config().assoc() * cache.config().block_size()) as u64;

    let mut state: u64 = 0x2545_F491_4F6C_DD1D;
    let mut touches = 0;
    for i in 0..10_000 {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let addr = (state >> 16) & 0x3FF;
        let record = match i % 3 {
            0 => format!(" L {addr:x},4"),
            1 => format!(" S {addr:x},4"),
            _ => format!(" M {addr:x},4"),
        };
        let record = Record::parse(&record).unwrap();
        touches += record.accesses().len() as u64;
        cache.replay(record);
    }

    let c = cache.counters();
    assert_eq!(c.hits + c.misses, touches);
    assert!(c.evictions <= c.misses);
    assert!(c.dirty_active_bytes <= geometry_bytes);
    assert_eq!(c.dirty_evicted_bytes % cache.config().block_size() as u64, 0);
}
