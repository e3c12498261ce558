//! # Report — Prime Notifications and Batch Reports
//!
//! Workers announce primes the moment they are proven, in completion order;
//! the orchestrator announces each drained batch's summary. Both go through
//! the [`Reporter`] trait so the binary can print them and tests can collect
//! them.

use crate::mersenne::TestOutcome;
use crate::stats::BatchSummary;
use tracing::{error, info};

/// Sink for search output. Called concurrently from worker threads.
pub trait Reporter: Send + Sync {
    fn prime_found(&self, outcome: &TestOutcome);
    fn batch_complete(&self, batch: u64, summary: &BatchSummary);
    /// A unit panicked. It still counted as complete for its batch.
    fn unit_failed(&self, exponent: u32, message: &str) {
        error!(exponent, message, "Mersenne test failed");
    }
    /// A stop request ended the run; `pending` units were still outstanding.
    fn shutdown_started(&self, _pending: usize) {}
}

/// Decimal digits of 2^p − 1 (equal to those of 2^p, which is never a power of ten).
pub fn mersenne_digits(p: u32) -> u64 {
    if p == 0 {
        return 1;
    }
    (f64::from(p) * std::f64::consts::LOG10_2) as u64 + 1
}

/// Line-oriented console output: one line per prime and per batch on
/// stdout, mirrored as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter {
    /// Print batch summaries as JSON lines instead of text.
    pub json: bool,
}

impl LogReporter {
    pub fn new(json: bool) -> Self {
        LogReporter { json }
    }
}

impl Reporter for LogReporter {
    fn prime_found(&self, outcome: &TestOutcome) {
        let digits = mersenne_digits(outcome.exponent);
        info!(
            exponent = outcome.exponent,
            digits,
            phase = %outcome.resolved_by,
            "*** PRIME FOUND ***"
        );
        println!("p = {} :) M{} is prime ({} digits)", outcome.exponent, outcome.exponent, digits);
    }

    fn batch_complete(&self, batch: u64, summary: &BatchSummary) {
        info!(
            batch,
            min_exponent = summary.min_exponent,
            max_exponent = summary.max_exponent,
            factored_only_percent = summary.factored_only_percent,
            lucas_lehmer_runs = summary.lucas_lehmer_runs,
            "batch complete"
        );
        if self.json {
            match serde_json::to_string(summary) {
                Ok(line) => println!("{}", line),
                Err(e) => error!(batch, error = %e, "could not serialize batch summary"),
            }
        } else {
            println!("{}", summary);
        }
    }

    fn shutdown_started(&self, _pending: usize) {
        println!("Shutting down..");
    }
}
