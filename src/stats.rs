//! # Stats — Per-Batch Timing and Yield Statistics
//!
//! Every worker whose test belongs to the current batch records into one
//! shared [`BatchStats`]; the orchestrator reads it only after the batch's
//! completion latch has drained, then discards it. All counters, duration
//! sums and the exponent range are read-modify-write, so they live behind a
//! single `Mutex` rather than independent atomics (min/max and the
//! count/sum pairs must move together).

use anyhow::{ensure, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default, Clone)]
struct Tally {
    factor_searches: u32,
    lucas_lehmer_runs: u32,
    factoring_time: Duration,
    lucas_lehmer_time: Duration,
    min_exponent: Option<u32>,
    max_exponent: Option<u32>,
}

impl Tally {
    fn observe(&mut self, p: u32) {
        self.min_exponent = Some(self.min_exponent.map_or(p, |m| m.min(p)));
        self.max_exponent = Some(self.max_exponent.map_or(p, |m| m.max(p)));
    }
}

/// Concurrent accumulator for one batch of Mersenne tests.
#[derive(Debug, Default)]
pub struct BatchStats {
    tally: Mutex<Tally>,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// One trial-factoring phase finished for exponent `p`.
    pub fn record_factor_search(&self, p: u32, elapsed: Duration) {
        let mut tally = self.lock();
        tally.factor_searches += 1;
        tally.factoring_time += elapsed;
        tally.observe(p);
    }

    /// One Lucas–Lehmer phase finished for exponent `p`.
    pub fn record_lucas_lehmer(&self, p: u32, elapsed: Duration) {
        let mut tally = self.lock();
        tally.lucas_lehmer_runs += 1;
        tally.lucas_lehmer_time += elapsed;
        tally.observe(p);
    }

    /// Aggregate the batch. Fails if no factor search was recorded, since
    /// every percentage and average is relative to that count.
    pub fn summary(&self) -> Result<BatchSummary> {
        let tally = self.lock().clone();
        ensure!(
            tally.factor_searches > 0,
            "batch summary requested with no recorded factor searches"
        );
        // Both are Some once anything has been recorded.
        let (min_exponent, max_exponent) = match (tally.min_exponent, tally.max_exponent) {
            (Some(min), Some(max)) => (min, max),
            _ => anyhow::bail!("batch recorded factor searches without an exponent range"),
        };

        let factored_only = tally.factor_searches.saturating_sub(tally.lucas_lehmer_runs);
        let factored_only_percent =
            f64::from(factored_only) / f64::from(tally.factor_searches) * 100.0;
        let avg_lucas_lehmer = (tally.lucas_lehmer_runs > 0)
            .then(|| tally.lucas_lehmer_time / tally.lucas_lehmer_runs);

        Ok(BatchSummary {
            min_exponent,
            max_exponent,
            factor_searches: tally.factor_searches,
            lucas_lehmer_runs: tally.lucas_lehmer_runs,
            factored_only_percent,
            avg_factoring: tally.factoring_time / tally.factor_searches,
            avg_lucas_lehmer,
        })
    }

    // Recording never panics while holding the guard.
    fn lock(&self) -> MutexGuard<'_, Tally> {
        self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Aggregated view of one drained batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub min_exponent: u32,
    pub max_exponent: u32,
    pub factor_searches: u32,
    pub lucas_lehmer_runs: u32,
    /// Share of tests decided by trial factoring without Lucas–Lehmer.
    pub factored_only_percent: f64,
    #[serde(rename = "avg_factoring_ms", serialize_with = "millis")]
    pub avg_factoring: Duration,
    #[serde(rename = "avg_lucas_lehmer_ms", serialize_with = "opt_millis")]
    pub avg_lucas_lehmer: Option<Duration>,
}

fn millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_nanos() as f64 / 1e6)
}

fn opt_millis<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => millis(d, s),
        None => s.serialize_none(),
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Between exponents {} and {}, resolved by trial factoring {:.2}% of the time, \
             average factor time={}ms, average Lucas Lehmer time=",
            self.min_exponent,
            self.max_exponent,
            self.factored_only_percent,
            self.avg_factoring.as_millis(),
        )?;
        match self.avg_lucas_lehmer {
            Some(d) => write!(f, "{}ms", d.as_millis()),
            None => write!(f, "n/a"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn empty_batch_summary_is_an_error() {
        let stats = BatchStats::new();
        assert!(stats.summary().is_err());
    }

    /// Lucas–Lehmer records alone cannot be summarised either.
    #[test]
    fn lucas_lehmer_without_factor_search_is_an_error() {
        let stats = BatchStats::new();
        stats.record_lucas_lehmer(89, ms(10));
        assert!(stats.summary().is_err());
    }

    #[test]
    fn hand_computed_summary() {
        let stats = BatchStats::new();
        stats.record_factor_search(31, ms(2));
        stats.record_factor_search(11, ms(4));
        stats.record_factor_search(89, ms(6));
        stats.record_factor_search(107, ms(8));
        stats.record_lucas_lehmer(89, ms(30));
        stats.record_lucas_lehmer(107, ms(50));

        let summary = stats.summary().unwrap();
        assert_eq!(summary.min_exponent, 11);
        assert_eq!(summary.max_exponent, 107);
        assert_eq!(summary.factor_searches, 4);
        assert_eq!(summary.lucas_lehmer_runs, 2);
        assert!((summary.factored_only_percent - 50.0).abs() < 1e-9);
        assert_eq!(summary.avg_factoring, ms(5));
        assert_eq!(summary.avg_lucas_lehmer, Some(ms(40)));
    }

    #[test]
    fn fractional_percentage() {
        let stats = BatchStats::new();
        for p in [3, 5, 7] {
            stats.record_factor_search(p, ms(1));
        }
        stats.record_lucas_lehmer(7, ms(3));
        let summary = stats.summary().unwrap();
        assert!((summary.factored_only_percent - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.avg_factoring, ms(1));
        assert_eq!(summary.avg_lucas_lehmer, Some(ms(3)));
    }

    #[test]
    fn no_lucas_lehmer_runs_reports_none() {
        let stats = BatchStats::new();
        stats.record_factor_search(11, ms(3));
        let summary = stats.summary().unwrap();
        assert!((summary.factored_only_percent - 100.0).abs() < 1e-9);
        assert_eq!(summary.avg_lucas_lehmer, None);
        assert!(summary.to_string().ends_with("average Lucas Lehmer time=n/a"));
    }

    #[test]
    fn display_format() {
        let stats = BatchStats::new();
        stats.record_factor_search(5, ms(1));
        stats.record_factor_search(61, ms(3));
        stats.record_lucas_lehmer(61, ms(7));
        let line = stats.summary().unwrap().to_string();
        assert_eq!(
            line,
            "Between exponents 5 and 61, resolved by trial factoring 50.00% of the time, \
             average factor time=2ms, average Lucas Lehmer time=7ms"
        );
    }

    #[test]
    fn summary_serializes_millis() {
        let stats = BatchStats::new();
        stats.record_factor_search(13, Duration::from_micros(1500));
        let json = serde_json::to_value(stats.summary().unwrap()).unwrap();
        assert_eq!(json["min_exponent"], 13);
        assert_eq!(json["avg_factoring_ms"], 1.5);
        assert!(json["avg_lucas_lehmer_ms"].is_null());
    }

    /// Out-of-order recording still yields the true min/max.
    #[test]
    fn min_max_independent_of_record_order() {
        let stats = BatchStats::new();
        for p in [53, 2, 1279, 17, 607] {
            stats.record_factor_search(p, ms(1));
        }
        let summary = stats.summary().unwrap();
        assert_eq!((summary.min_exponent, summary.max_exponent), (2, 1279));
    }

    #[test]
    fn concurrent_writers_lose_nothing() {
        let stats = Arc::new(BatchStats::new());
        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for i in 0..250u32 {
                        let p = t * 1000 + i + 1;
                        stats.record_factor_search(p, ms(2));
                        if i % 5 == 0 {
                            stats.record_lucas_lehmer(p, ms(10));
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let summary = stats.summary().unwrap();
        assert_eq!(summary.factor_searches, 2000);
        assert_eq!(summary.lucas_lehmer_runs, 400);
        assert_eq!(summary.min_exponent, 1);
        assert_eq!(summary.max_exponent, 7250);
        assert_eq!(summary.avg_factoring, ms(2));
        assert_eq!(summary.avg_lucas_lehmer, Some(ms(10)));
        assert!((summary.factored_only_percent - 80.0).abs() < 1e-9);
    }
}
