//! # Main — CLI Entry Point
//!
//! Parses flags, merges them over the optional TOML config, initialises
//! logging and hands off to [`cli::run_search`].
//!
//! ## Options
//!
//! - `--config`: TOML file with any `SearchConfig` keys.
//! - `--batch-size`: tests per statistics report (default 100).
//! - `--small-prime-ceiling`: exponent stream / pre-filter table ceiling (default 1,000,000).
//! - `--hard-factor-ceiling`: absolute cap on trial factors (default 2^32).
//! - `--small-factor-threshold`: largest pre-filter prime (default 100).
//! - `--threads`: worker pool size (default: all cores).
//! - `--grace-period-secs`: shutdown wait for running tests (default 10).
//! - `--max-exponent`: stop after this exponent instead of running to the ceiling.
//! - `--json`: batch reports as JSON lines.
//!
//! Every option also reads a `MERSENNE_*` environment variable (a `.env`
//! file is honoured). `LOG_FORMAT=json` switches logs to JSON, `RUST_LOG`
//! sets the filter.

mod cli;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "mersenne-hunter", about = "Search for Mersenne primes 2^p - 1")]
struct Cli {
    /// TOML configuration file (flags override its values)
    #[arg(long, env = "MERSENNE_CONFIG")]
    config: Option<PathBuf>,

    /// Number of tests grouped before a statistics report
    #[arg(long, env = "MERSENNE_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Exclusive ceiling of the small-prime table feeding exponents and the pre-filter
    #[arg(long, env = "MERSENNE_SMALL_PRIME_CEILING")]
    small_prime_ceiling: Option<u32>,

    /// Absolute cap on the trial-factor search bound
    #[arg(long, env = "MERSENNE_HARD_FACTOR_CEILING")]
    hard_factor_ceiling: Option<u64>,

    /// Largest small prime used to discard composite trial factors
    #[arg(long, env = "MERSENNE_SMALL_FACTOR_THRESHOLD")]
    small_factor_threshold: Option<u32>,

    /// Worker threads (defaults to all logical cores)
    #[arg(long, env = "MERSENNE_THREADS")]
    threads: Option<usize>,

    /// Seconds to wait for running tests on shutdown
    #[arg(long, env = "MERSENNE_GRACE_PERIOD_SECS")]
    grace_period_secs: Option<u64>,

    /// Largest exponent to test
    #[arg(long, env = "MERSENNE_MAX_EXPONENT")]
    max_exponent: Option<u32>,

    /// Seconds between progress log lines (0 disables)
    #[arg(long, env = "MERSENNE_STATUS_INTERVAL_SECS")]
    status_interval_secs: Option<u64>,

    /// Print batch reports as JSON lines
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log shipping, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let config = cli::resolve_config(&cli)?;
    cli::run_search(config, cli.json)
}
