//! # Mersenne — Two-Phase Primality Test for 2^p − 1
//!
//! Decides whether M_p = 2^p − 1 is prime for a single exponent p.
//!
//! ## Phase 1: Bounded Trial Factoring
//!
//! Every factor q of M_p (p an odd prime) satisfies
//!
//! - q = 2·k·p + 1 for some k ≥ 1, and
//! - q ≡ ±1 (mod 8).
//!
//! Candidates of that form up to ≈ √M_p (2^⌈L/2⌉ − 1, L = bit length of M_p)
//! are enumerated, capped at a hard ceiling (2^32 by default) so no single
//! test trial-factors unboundedly. Candidates ≡ 3, 5 (mod 8) and candidates
//! with a small prime divisor other than themselves are skipped; the latter
//! are composite and their prime divisors are tried on their own. Survivors
//! are checked with [`mod_pow2`]: 2^p ≡ 1 (mod q) ⇔ q | M_p.
//!
//! If the bound was not clamped the search covered all of [2, √M_p], so no
//! factor means M_p is prime and Phase 2 is skipped.
//!
//! ## Phase 2: Lucas–Lehmer
//!
//! s₀ = 4, s ← (s² mod M_p) − 2 repeated p − 2 times; M_p is prime iff the
//! final s is 0. M₂ = 3 is prime without any iteration.
//!
//! ## Liveness
//!
//! Neither phase polls for cancellation. A running Lucas–Lehmer loop for a
//! large exponent finishes its p − 2 squarings even after a stop request.
//!
//! ## References
//!
//! - GIMPS, "Mathematics": <https://www.mersenne.org/various/math.php>
//! - D. H. Lehmer, "An Extended Theory of Lucas' Functions", Annals of
//!   Mathematics, 31(3):419–448, 1930.

use rug::ops::RemRounding;
use rug::Integer;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::latch::CompletionToken;
use crate::prime_source::{self, PrimeSource};
use crate::report::Reporter;
use crate::stats::BatchStats;

/// Default absolute cap on the trial-factor search bound.
pub const HARD_FACTOR_CEILING: u64 = 1 << 32;

/// Default cap on the small primes used by the compositeness pre-filter.
pub const SMALL_FACTOR_THRESHOLD: u32 = 100;

/// Compute M_p = 2^p − 1.
pub fn mersenne_number(p: u32) -> Integer {
    (Integer::from(1u32) << p) - 1u32
}

/// Trial-factoring limits for one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactorLimits {
    pub hard_ceiling: u64,
    pub small_factor_threshold: u32,
}

impl Default for FactorLimits {
    fn default() -> Self {
        FactorLimits {
            hard_ceiling: HARD_FACTOR_CEILING,
            small_factor_threshold: SMALL_FACTOR_THRESHOLD,
        }
    }
}

/// Largest trial factor to try, and whether the hard ceiling cut it short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBound {
    pub max_factor: u64,
    pub clamped: bool,
}

/// Search bound for a Mersenne number of `bit_len` bits:
/// min(2^⌈bit_len/2⌉ − 1, hard_ceiling).
pub fn search_bound(bit_len: u32, hard_ceiling: u64) -> SearchBound {
    let half = bit_len.div_ceil(2);
    let unclamped = if half < 64 {
        Some((1u64 << half) - 1)
    } else {
        None
    };
    match unclamped {
        Some(max_factor) if max_factor <= hard_ceiling => SearchBound {
            max_factor,
            clamped: false,
        },
        _ => SearchBound {
            max_factor: hard_ceiling,
            clamped: true,
        },
    }
}

/// 2^p mod `modulus` by left-to-right binary exponentiation.
///
/// The exponent's bits are reversed and the leading-zero positions shifted
/// out, so the most significant bit is consumed first: square, then double
/// when the current bit is set. u128 intermediates keep every modulus up to
/// 2^64 − 1 exact.
pub fn mod_pow2(p: u32, modulus: u64) -> u64 {
    assert!(modulus > 0, "mod_pow2 modulus must be positive");
    let m = u128::from(modulus);
    let leading_zeros = p.leading_zeros();
    let mut remaining = u32::BITS - leading_zeros;
    let mut bits = p.reverse_bits().checked_shr(leading_zeros).unwrap_or(0);

    let mut x: u128 = 1 % m;
    while remaining > 0 {
        x = x * x % m;
        if bits & 1 == 1 {
            x = (x << 1) % m;
        }
        bits >>= 1;
        remaining -= 1;
    }
    x as u64
}

/// True if some prime in `small_primes` other than `candidate` itself
/// divides `candidate`.
pub fn has_small_prime_factor(candidate: u64, small_primes: &[u32]) -> bool {
    small_primes.iter().any(|&q| {
        let q = u64::from(q);
        candidate != q && candidate % q == 0
    })
}

/// Smallest factor of M_p of the form 2kp + 1 not exceeding `max_factor`
/// that survives the mod-8 and small-prime filters.
pub fn find_factor(p: u32, max_factor: u64, small_primes: &[u32]) -> Option<u64> {
    if p < 2 {
        return None;
    }
    let two_p = 2 * u64::from(p);
    let mut candidate = two_p + 1;
    while candidate <= max_factor {
        let residue = candidate & 7;
        if (residue == 1 || residue == 7)
            && !has_small_prime_factor(candidate, small_primes)
            && mod_pow2(p, candidate) == 1
        {
            return Some(candidate);
        }
        candidate = candidate.checked_add(two_p)?;
    }
    None
}

/// Lucas–Lehmer test of M_p. Exponents below 2 are never prime; p = 2 is
/// prime without iterating.
pub fn lucas_lehmer(p: u32) -> bool {
    lucas_lehmer_mod(p, &mersenne_number(p))
}

fn lucas_lehmer_mod(p: u32, m: &Integer) -> bool {
    match p {
        0 | 1 => return false,
        2 => return true,
        _ => {}
    }

    let iterations = p - 2;
    let mut s = Integer::from(4u32);
    for i in 0..iterations {
        if i > 0 && i % 10_000 == 0 {
            debug!(
                exponent = p,
                squarings = i,
                total = iterations,
                "Lucas-Lehmer progress"
            );
        }
        s.square_mut();
        s = s.rem_euc(m);
        s -= 2u32;
    }
    s == 0u32
}

/// Which phase produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    TrialFactoring,
    LucasLehmer,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::TrialFactoring => write!(f, "trial factoring"),
            Phase::LucasLehmer => write!(f, "Lucas-Lehmer"),
        }
    }
}

/// Verdict and phase timings for one exponent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub exponent: u32,
    pub is_prime: bool,
    pub resolved_by: Phase,
    /// Factor found by Phase 1, if any.
    pub factor: Option<u64>,
    pub bound: SearchBound,
    pub factoring: Duration,
    /// `None` when Phase 1 was conclusive.
    pub lucas_lehmer: Option<Duration>,
}

/// Single-use tester for M_p.
///
/// Statistics, a prime reporter and a completion token can be attached; the
/// token is released exactly once when `test` returns, whichever phase
/// decided the verdict.
pub struct Tester<'a> {
    p: u32,
    primes: &'a PrimeSource,
    limits: FactorLimits,
    stats: Option<&'a BatchStats>,
    reporter: Option<&'a dyn Reporter>,
    completion: Option<CompletionToken>,
}

impl<'a> Tester<'a> {
    pub fn new(p: u32, primes: &'a PrimeSource, limits: FactorLimits) -> Self {
        Tester {
            p,
            primes,
            limits,
            stats: None,
            reporter: None,
            completion: None,
        }
    }

    pub fn with_stats(mut self, stats: &'a BatchStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_reporter(mut self, reporter: &'a dyn Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_completion(mut self, token: CompletionToken) -> Self {
        self.completion = Some(token);
        self
    }

    /// Run both phases as needed. Consumes the tester.
    pub fn test(self) -> TestOutcome {
        let Tester {
            p,
            primes,
            limits,
            stats,
            reporter,
            completion,
        } = self;

        let start = Instant::now();
        let m = mersenne_number(p);
        let bound = search_bound(m.significant_bits(), limits.hard_ceiling);
        let factor = find_factor(
            p,
            bound.max_factor,
            primes.up_to(limits.small_factor_threshold),
        );
        let factoring = start.elapsed();
        if let Some(stats) = stats {
            stats.record_factor_search(p, factoring);
        }

        let decided_by_factoring = if p < 2 || factor.is_some() {
            Some(false)
        } else if !bound.clamped && p % 2 == 1 && prime_source::is_prime(p) {
            // The 2kp + 1 form only constrains factors for odd prime p.
            Some(true)
        } else {
            None
        };

        let outcome = match decided_by_factoring {
            Some(is_prime) => TestOutcome {
                exponent: p,
                is_prime,
                resolved_by: Phase::TrialFactoring,
                factor,
                bound,
                factoring,
                lucas_lehmer: None,
            },
            None => {
                let start = Instant::now();
                let is_prime = lucas_lehmer_mod(p, &m);
                let elapsed = start.elapsed();
                if let Some(stats) = stats {
                    stats.record_lucas_lehmer(p, elapsed);
                }
                TestOutcome {
                    exponent: p,
                    is_prime,
                    resolved_by: Phase::LucasLehmer,
                    factor: None,
                    bound,
                    factoring,
                    lucas_lehmer: Some(elapsed),
                }
            }
        };

        if outcome.is_prime {
            if let Some(reporter) = reporter {
                reporter.prime_found(&outcome);
            }
        }
        drop(completion);
        outcome
    }
}
