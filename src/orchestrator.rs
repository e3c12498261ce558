//! # Orchestrator — Batched Parallel Mersenne Search
//!
//! Drives a fixed-size Rayon pool over an ascending exponent stream. Work is
//! grouped into batches of `batch_size` exponents:
//!
//! ```text
//! FILLING ──► DRAINING ──► REPORTED ──► FILLING (fresh batch)
//!    │            │
//!    └── stop ────┴──► shutdown (cancel queued units, bounded grace wait)
//! ```
//!
//! - **FILLING**: pull exponents and spawn one independent unit per exponent,
//!   each bound to the batch's [`BatchStats`] and [`CompletionLatch`].
//! - **DRAINING**: block until every unit of the batch has signalled. This is
//!   the only blocking point and caps in-flight work at one batch.
//! - **REPORTED**: summarise the drained statistics, hand them to the
//!   [`Reporter`], and drop the batch. The next batch gets new instances, so
//!   no worker can ever write into statistics that are being read.
//!
//! Units complete in any order (trial factoring takes microseconds,
//! Lucas–Lehmer on a large exponent takes minutes), so primes are reported
//! by the unit that proves them, as soon as it does.
//!
//! ## Shutdown
//!
//! When the stop flag is raised the orchestrator stops pulling exponents,
//! marks the run cancelled so queued units return without testing (still
//! signalling), and waits at most the grace period for running units.
//! Running tests cannot be interrupted; whatever is still running after the
//! grace period is abandoned to process exit.

use anyhow::Result;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::SearchConfig;
use crate::latch::{CompletionLatch, Drain};
use crate::mersenne::{FactorLimits, TestOutcome, Tester};
use crate::prime_source::PrimeSource;
use crate::progress::Progress;
use crate::report::Reporter;
use crate::stats::{BatchStats, BatchSummary};

/// How often a blocked drain re-checks the stop flag.
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Work performed by one pool unit for one exponent.
type Unit = fn(u32, &PrimeSource, FactorLimits, &Batch) -> TestOutcome;

fn test_exponent(
    p: u32,
    primes: &PrimeSource,
    limits: FactorLimits,
    batch: &Batch,
) -> TestOutcome {
    Tester::new(p, primes, limits)
        .with_stats(&batch.stats)
        .with_reporter(batch)
        .test()
}

/// Totals over a whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Batches drained and reported.
    pub batches: u64,
    /// Exponents handed to the pool.
    pub submitted: u64,
    /// Tests that finished trial factoring, over reported batches.
    pub tested: u64,
    pub lucas_lehmer_runs: u64,
    /// Exponents whose Mersenne number was proven prime, ascending.
    pub primes: Vec<u32>,
    /// The run ended on a stop request rather than stream exhaustion.
    pub interrupted: bool,
    /// Units still running when the grace period ran out.
    pub abandoned: usize,
}

/// Per-batch shared state. Lives exactly as long as the batch.
struct Batch {
    stats: BatchStats,
    latch: Arc<CompletionLatch>,
    found: Mutex<Vec<u32>>,
    reporter: Arc<dyn Reporter>,
}

impl Batch {
    fn new(reporter: Arc<dyn Reporter>) -> Arc<Self> {
        Arc::new(Batch {
            stats: BatchStats::new(),
            latch: CompletionLatch::new(),
            found: Mutex::new(Vec::new()),
            reporter,
        })
    }

    fn take_found(&self) -> Vec<u32> {
        std::mem::take(&mut *self.found.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Reporter for Batch {
    fn prime_found(&self, outcome: &TestOutcome) {
        self.found
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome.exponent);
        self.reporter.prime_found(outcome);
    }

    fn batch_complete(&self, batch: u64, summary: &BatchSummary) {
        self.reporter.batch_complete(batch, summary);
    }

    fn unit_failed(&self, exponent: u32, message: &str) {
        self.reporter.unit_failed(exponent, message);
    }

    fn shutdown_started(&self, pending: usize) {
        self.reporter.shutdown_started(pending);
    }
}

pub struct BatchOrchestrator {
    config: SearchConfig,
    primes: Arc<PrimeSource>,
    pool: rayon::ThreadPool,
    stop: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    progress: Arc<Progress>,
    unit: Unit,
}

impl BatchOrchestrator {
    /// Validate `config` and build the worker pool. `stop` is the external
    /// shutdown request, typically raised by a signal handler.
    pub fn new(
        config: SearchConfig,
        primes: Arc<PrimeSource>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads())
            .thread_name(|i| format!("mersenne-worker-{}", i))
            .panic_handler(|_| error!("worker thread panicked outside a Mersenne test"))
            .build()?;
        Ok(BatchOrchestrator {
            config,
            primes,
            pool,
            stop,
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: Progress::new(),
            unit: test_exponent,
        })
    }

    pub fn progress(&self) -> &Arc<Progress> {
        &self.progress
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Test every exponent of `exponents` in batches until the stream ends
    /// or the stop flag is raised.
    pub fn run<I>(&self, exponents: I, reporter: Arc<dyn Reporter>) -> Result<RunSummary>
    where
        I: IntoIterator<Item = u32>,
    {
        let batch_size = self.config.batch_size;
        let mut stream = exponents.into_iter();
        let mut summary = RunSummary::default();
        let status = self
            .config
            .status_interval()
            .map(|interval| self.progress.start_reporter(interval));

        info!(
            batch_size,
            threads = self.worker_threads(),
            hard_factor_ceiling = self.config.hard_factor_ceiling,
            small_factor_threshold = self.config.small_factor_threshold,
            "Mersenne search starting"
        );

        // Batch whose drain was cut short by a stop request.
        let mut interrupted_batch = None;
        let mut batch_index: u64 = 0;
        loop {
            if self.stop.load(Ordering::Relaxed) {
                summary.interrupted = true;
                break;
            }

            // Filling
            let batch = Batch::new(Arc::clone(&reporter));
            let mut submitted = 0;
            while submitted < batch_size && !self.stop.load(Ordering::Relaxed) {
                let Some(p) = stream.next() else { break };
                self.submit(p, &batch);
                submitted += 1;
            }
            summary.submitted += submitted as u64;
            if submitted == 0 {
                summary.interrupted = self.stop.load(Ordering::Relaxed);
                break;
            }

            // Draining
            debug!(batch = batch_index, submitted, "batch draining");
            if batch.latch.wait_or_stop(&self.stop, DRAIN_POLL) == Drain::Interrupted {
                summary.interrupted = true;
                interrupted_batch = Some(batch);
                break;
            }

            // Reported
            debug!(batch = batch_index, "batch drained");
            self.report(batch_index, &batch, &mut summary);
            batch_index += 1;

            if submitted < batch_size {
                // Stream ran dry mid-batch.
                summary.interrupted = self.stop.load(Ordering::Relaxed);
                break;
            }
        }

        if summary.interrupted {
            summary.abandoned =
                self.shutdown(interrupted_batch.as_ref().map(|b| &*b.latch), &*reporter);
            if let Some(batch) = interrupted_batch {
                summary.primes.extend(batch.take_found());
            }
        }

        self.progress.stop();
        if let Some(handle) = status {
            let _ = handle.join();
        }
        self.progress.print_status();
        summary.primes.sort_unstable();

        info!(
            batches = summary.batches,
            tested = summary.tested,
            primes = summary.primes.len(),
            interrupted = summary.interrupted,
            "Mersenne search finished"
        );
        Ok(summary)
    }

    /// Spawn one unit. The completion token stays with the unit until its
    /// outcome or failure has been recorded, so a drained batch has nothing
    /// left to report.
    fn submit(&self, p: u32, batch: &Arc<Batch>) {
        self.progress.current.fetch_max(p, Ordering::Relaxed);
        let token = batch.latch.register();
        let batch = Arc::clone(batch);
        let primes = Arc::clone(&self.primes);
        let cancelled = Arc::clone(&self.cancelled);
        let progress = Arc::clone(&self.progress);
        let limits = self.config.factor_limits();
        let unit = self.unit;

        self.pool.spawn(move || {
            if cancelled.load(Ordering::Relaxed) {
                token.complete();
                return;
            }
            let result =
                panic::catch_unwind(AssertUnwindSafe(|| unit(p, &primes, limits, &batch)));
            match result {
                Ok(outcome) => progress.record(&outcome),
                Err(payload) => {
                    progress.failed.fetch_add(1, Ordering::Relaxed);
                    batch.unit_failed(p, &panic_message(payload.as_ref()));
                }
            }
            token.complete();
        });
    }

    fn report(&self, index: u64, batch: &Batch, summary: &mut RunSummary) {
        summary.primes.extend(batch.take_found());
        match batch.stats.summary() {
            Ok(batch_summary) => {
                summary.batches += 1;
                summary.tested += u64::from(batch_summary.factor_searches);
                summary.lucas_lehmer_runs += u64::from(batch_summary.lucas_lehmer_runs);
                batch.reporter.batch_complete(index, &batch_summary);
            }
            Err(e) => {
                // Only reachable if every unit of the batch failed.
                error!(batch = index, error = %e, "batch drained without statistics");
            }
        }
    }

    /// Cancel queued units and wait out the grace period for the running
    /// ones of `latch`. Returns how many units were still outstanding.
    fn shutdown(&self, latch: Option<&CompletionLatch>, reporter: &dyn Reporter) -> usize {
        let pending = latch.map_or(0, CompletionLatch::pending);
        info!(
            pending,
            grace_secs = self.config.grace_period_secs,
            "Shutting down.."
        );
        reporter.shutdown_started(pending);
        self.cancelled.store(true, Ordering::Relaxed);
        match latch {
            Some(latch) if !latch.wait_timeout(self.config.grace_period()) => {
                let pending = latch.pending();
                warn!(pending, "grace period expired, abandoning running tests");
                pending
            }
            _ => 0,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
