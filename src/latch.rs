//! # Latch — Batch Completion Signal
//!
//! A counted completion signal: the orchestrator registers one
//! [`CompletionToken`] per submitted unit and then blocks until every token
//! has been released. Tokens are not `Clone` and release on `Drop`, so each
//! unit signals exactly once, including when it unwinds from a panic.
//!
//! Waiting can be cut short by a stop flag (`wait_or_stop`), which is the
//! normal shutdown path and is reported as [`Drain::Interrupted`] rather
//! than as a failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Result of waiting on a latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// Every registered unit has signalled.
    Complete,
    /// The stop flag was raised before the batch drained.
    Interrupted,
}

#[derive(Debug, Default)]
struct Counts {
    registered: usize,
    completed: usize,
}

#[derive(Debug, Default)]
pub struct CompletionLatch {
    counts: Mutex<Counts>,
    drained: Condvar,
}

impl CompletionLatch {
    pub fn new() -> Arc<Self> {
        Arc::new(CompletionLatch::default())
    }

    /// Hand out a token for one more unit of work.
    pub fn register(self: &Arc<Self>) -> CompletionToken {
        self.lock().registered += 1;
        CompletionToken {
            latch: Arc::clone(self),
        }
    }

    /// Units registered but not yet signalled.
    pub fn pending(&self) -> usize {
        let counts = self.lock();
        counts.registered - counts.completed
    }

    /// Block for at most `timeout`. Returns true if the latch drained.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut counts = self.lock();
        while counts.completed < counts.registered {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            counts = self
                .drained
                .wait_timeout(counts, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Block until drained, re-checking `stop` every `poll`.
    pub fn wait_or_stop(&self, stop: &AtomicBool, poll: Duration) -> Drain {
        loop {
            if self.wait_timeout(poll) {
                return Drain::Complete;
            }
            if stop.load(Ordering::Relaxed) {
                return Drain::Interrupted;
            }
        }
    }

    fn count_down(&self) {
        let mut counts = self.lock();
        counts.completed += 1;
        debug_assert!(counts.completed <= counts.registered);
        if counts.completed == counts.registered {
            self.drained.notify_all();
        }
    }

    // Never held across user code, so a poisoned guard still has valid counts.
    fn lock(&self) -> MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single-use completion signal for one unit of work.
#[derive(Debug)]
#[must_use = "dropping the token immediately signals completion"]
pub struct CompletionToken {
    latch: Arc<CompletionLatch>,
}

impl CompletionToken {
    /// Signal completion now. Equivalent to dropping the token.
    pub fn complete(self) {}
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        self.latch.count_down();
    }
}
