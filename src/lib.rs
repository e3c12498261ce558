//! Parallel search for Mersenne primes 2^p − 1.
//!
//! Exponents from a [`PrimeSource`] are tested in batches by a
//! [`BatchOrchestrator`]; each test trial-factors M_p up to a bounded limit
//! and falls back to Lucas–Lehmer when factoring is inconclusive. Every
//! drained batch produces a [`BatchSummary`].

pub mod config;
pub mod latch;
pub mod mersenne;
pub mod orchestrator;
pub mod prime_source;
pub mod progress;
pub mod report;
pub mod stats;

pub use config::SearchConfig;
pub use mersenne::{FactorLimits, Phase, TestOutcome, Tester};
pub use orchestrator::{BatchOrchestrator, RunSummary};
pub use prime_source::PrimeSource;
pub use report::{LogReporter, Reporter};
pub use stats::{BatchStats, BatchSummary};
