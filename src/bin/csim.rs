//! Trace-driven cache simulator.
//!
//! Replays a valgrind-style memory trace against a configurable cache
//! geometry and prints the six summary counters. With `-v` every
//! memory-touching record is echoed together with what it did to the
//! cache (`hit`, `miss`, `dirty-miss`, `eviction`, ...).

use memkit::cache::{trace::Record, Cache, Config};

use clap::Parser;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "csim", about = "Simulate a cache over a valgrind memory trace")]
struct Cli {
    /// Display the outcome of every traced access.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Number of set index bits (the cache has 2^s sets).
    #[arg(short = 's', value_name = "s")]
    set_bits: u32,

    /// Associativity (number of lines per set).
    #[arg(short = 'E', value_name = "E")]
    assoc: usize,

    /// Number of block bits (blocks are 2^b bytes).
    #[arg(short = 'b', value_name = "b")]
    block_bits: u32,

    /// Trace file to replay.
    #[arg(short = 't', value_name = "tracefile")]
    trace: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.use_stderr() => {
            // bad usage
            let _ = err.print();
            return ExitCode::from(1);
        }
        Err(err) => {
            // --help and friends
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
    };

    let config = match Config::new(cli.set_bits, cli.assoc, cli.block_bits) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("csim: {err}");
            return ExitCode::from(1);
        }
    };

    let file = match File::open(&cli.trace) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("csim: {}: {err}", cli.trace.display());
            return ExitCode::from(2);
        }
    };

    let mut cache = Cache::new(config);
    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                eprintln!("csim: {}: {err}", cli.trace.display());
                return ExitCode::from(2);
            }
        };
        let Some(record) = Record::parse(&line) else {
            log::debug!("skipping unparseable trace line: {line:?}");
            continue;
        };
        let outcomes = cache.replay(record);
        if cli.verbose && !outcomes.is_empty() {
            print!("{} {:x},{}", record.type_char(), record.addr, record.len);
            for outcome in outcomes {
                print!(" {outcome}");
            }
            println!();
        }
    }

    println!("{}", cache.counters());
    ExitCode::SUCCESS
}
