//! # Progress — Run-Wide Search Counters
//!
//! Thread-safe totals shared between the worker units and a background status
//! reporter. Counters are atomics updated once per finished unit; unlike
//! [`BatchStats`](crate::stats::BatchStats) they span the whole run and are
//! never reset, and no reader needs them to be mutually consistent.
//!
//! ## Background Reporter
//!
//! A dedicated thread logs a status line every `interval`: exponents tested,
//! primes found, Lucas–Lehmer runs, rate (exponents/sec) and the highest
//! exponent submitted so far. It exits promptly once `stop` is called.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

use crate::mersenne::{Phase, TestOutcome};

const STOP_POLL: Duration = Duration::from_millis(100);

pub struct Progress {
    pub tested: AtomicU64,
    pub found: AtomicU64,
    pub lucas_lehmer: AtomicU64,
    pub failed: AtomicU64,
    /// Highest exponent handed to the pool.
    pub current: AtomicU32,
    start: Instant,
    shutdown: AtomicBool,
}

impl Progress {
    pub fn new() -> Arc<Self> {
        Arc::new(Progress {
            tested: AtomicU64::new(0),
            found: AtomicU64::new(0),
            lucas_lehmer: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            current: AtomicU32::new(0),
            start: Instant::now(),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Fold one finished test into the totals.
    pub fn record(&self, outcome: &TestOutcome) {
        self.tested.fetch_add(1, Ordering::Relaxed);
        if outcome.is_prime {
            self.found.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.resolved_by == Phase::LucasLehmer {
            self.lucas_lehmer.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn start_reporter(self: &Arc<Self>, interval: Duration) -> thread::JoinHandle<()> {
        let progress = Arc::clone(self);
        thread::spawn(move || loop {
            let mut waited = Duration::ZERO;
            while waited < interval {
                if progress.shutdown.load(Ordering::Relaxed) {
                    return;
                }
                let step = STOP_POLL.min(interval - waited);
                thread::sleep(step);
                waited += step;
            }
            if progress.shutdown.load(Ordering::Relaxed) {
                return;
            }
            progress.print_status();
        })
    }

    pub fn print_status(&self) {
        let elapsed = self.start.elapsed();
        let tested = self.tested.load(Ordering::Relaxed);
        let found = self.found.load(Ordering::Relaxed);
        let lucas_lehmer = self.lucas_lehmer.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let current = self.current.load(Ordering::Relaxed);
        let rate = if elapsed.as_secs() > 0 {
            tested as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let h = elapsed.as_secs() / 3600;
        let m = (elapsed.as_secs() % 3600) / 60;
        let s = elapsed.as_secs() % 60;
        info!(
            current,
            tested,
            found,
            lucas_lehmer,
            failed,
            rate = format_args!("{:.2}", rate),
            elapsed = format_args!("{:02}:{:02}:{:02}", h, m, s),
            "search progress"
        );
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
