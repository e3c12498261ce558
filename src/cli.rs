//! # CLI Execution Functions
//!
//! Configuration merging, the signal listener and the search run itself,
//! kept out of `main.rs` so the entry point stays declarative.

use anyhow::Result;
use mersenne_hunter::{BatchOrchestrator, LogReporter, PrimeSource, SearchConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::Cli;

/// Defaults, then the TOML file, then flags/env. Validated before returning.
pub fn resolve_config(cli: &Cli) -> Result<SearchConfig> {
    let mut config = match &cli.config {
        Some(path) => SearchConfig::load(path)?,
        None => SearchConfig::default(),
    };

    if let Some(v) = cli.batch_size {
        config.batch_size = v;
    }
    if let Some(v) = cli.small_prime_ceiling {
        config.small_prime_ceiling = v;
    }
    if let Some(v) = cli.hard_factor_ceiling {
        config.hard_factor_ceiling = v;
    }
    if let Some(v) = cli.small_factor_threshold {
        config.small_factor_threshold = v;
    }
    if cli.threads.is_some() {
        config.threads = cli.threads;
    }
    if let Some(v) = cli.grace_period_secs {
        config.grace_period_secs = v;
    }
    if cli.max_exponent.is_some() {
        config.max_exponent = cli.max_exponent;
    }
    if let Some(v) = cli.status_interval_secs {
        config.status_interval_secs = v;
    }

    config.validate()?;
    Ok(config)
}

// ── Search ──────────────────────────────────────────────────────

/// Build the prime table, start the pool and test exponents until the
/// stream ends or SIGINT/SIGTERM arrives.
pub fn run_search(config: SearchConfig, json: bool) -> Result<()> {
    let started = Instant::now();
    let primes = Arc::new(PrimeSource::build(config.small_prime_ceiling));
    info!(
        count = primes.len(),
        ceiling = config.small_prime_ceiling,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "prime source ready"
    );

    let stop = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(Arc::clone(&stop));

    let max_exponent = config.max_exponent;
    let orchestrator = BatchOrchestrator::new(config, Arc::clone(&primes), stop)?;
    let summary = orchestrator.run(
        primes.exponents(max_exponent),
        Arc::new(LogReporter::new(json)),
    )?;

    if summary.interrupted {
        println!("Bye");
    }
    Ok(())
}

/// Raise `stop` on SIGINT, or SIGTERM on unix.
fn spawn_signal_listener(stop: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        let sig_rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!(error = %e, "Could not start signal handler runtime");
                return;
            }
        };
        sig_rt.block_on(async {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        tokio::select! {
                            _ = ctrl_c => {},
                            _ = sigterm.recv() => {},
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "SIGTERM handler unavailable, listening for SIGINT only");
                        let _ = ctrl_c.await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
            }
            info!("stop requested");
            stop.store(true, Ordering::Relaxed);
        });
    });
}
