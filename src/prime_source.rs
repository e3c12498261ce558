//! # Prime Source — Ordered Small Primes
//!
//! Builds every prime below a ceiling once at startup and then serves two
//! read-only capabilities:
//!
//! 1. **Ordered, restartable stream** (`iter`, `exponents`, `IntoIterator`):
//!    the exponent feed for the batch orchestrator.
//! 2. **Lookup** (`nth`, `primes`): the small-prime table behind the
//!    trial-factor compositeness pre-filter.
//!
//! ## Algorithm: 6k ± 1 Trial Division
//!
//! Seeded with 2 and 3. Every other prime is of the form 6k − 1 or 6k + 1, so
//! for k = 1, 2, … both neighbours of 6k are trial-divided by the primes found
//! so far, stopping as soon as a prime exceeds the candidate's square root.
//! Survivors are appended, which keeps the table ascending.
//!
//! The table is immutable after `build`, so an `Arc<PrimeSource>` is shared
//! by all workers without locking.

/// Immutable ascending table of the primes below a ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimeSource {
    primes: Vec<u32>,
}

impl PrimeSource {
    /// Generate all primes strictly below `ceiling`. A ceiling of 0, 1 or 2
    /// yields an empty table.
    pub fn build(ceiling: u32) -> Self {
        let mut primes = Vec::with_capacity(estimate_prime_count(ceiling));
        for seed in [2u32, 3] {
            if seed < ceiling {
                primes.push(seed);
            }
        }

        let mut six_k: u64 = 6;
        while six_k < u64::from(ceiling) {
            for candidate in [six_k - 1, six_k + 1] {
                if candidate < u64::from(ceiling) && is_prime_against(candidate, &primes) {
                    primes.push(candidate as u32);
                }
            }
            six_k += 6;
        }

        primes.shrink_to_fit();
        PrimeSource { primes }
    }

    /// The whole table, ascending.
    pub fn primes(&self) -> &[u32] {
        &self.primes
    }

    /// The `i`-th prime (0-indexed), or `None` past the end of the table.
    pub fn nth(&self, i: usize) -> Option<u32> {
        self.primes.get(i).copied()
    }

    pub fn len(&self) -> usize {
        self.primes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primes.is_empty()
    }

    pub fn iter(&self) -> std::iter::Copied<std::slice::Iter<'_, u32>> {
        self.primes.iter().copied()
    }

    /// Ascending exponent stream, optionally cut off above `max_exponent`.
    /// Each call starts again from 2.
    pub fn exponents(&self, max_exponent: Option<u32>) -> impl Iterator<Item = u32> + '_ {
        let limit = max_exponent.unwrap_or(u32::MAX);
        self.iter().take_while(move |&p| p <= limit)
    }

    /// Primes not exceeding `threshold`, i.e. the pre-filter divisors.
    pub fn up_to(&self, threshold: u32) -> &[u32] {
        let end = self.primes.partition_point(|&p| p <= threshold);
        &self.primes[..end]
    }
}

impl<'a> IntoIterator for &'a PrimeSource {
    type Item = u32;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, u32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Standalone 6k ± 1 trial division for a single value (used to vet
/// exponents above the table's ceiling).
pub fn is_prime(n: u32) -> bool {
    if n < 4 {
        return n >= 2;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let n = u64::from(n);
    let mut i: u64 = 5;
    while i * i <= n {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

/// Trial division by the ascending `known` primes up to √candidate.
fn is_prime_against(candidate: u64, known: &[u32]) -> bool {
    for &q in known {
        let q = u64::from(q);
        if q * q > candidate {
            break;
        }
        if candidate % q == 0 {
            return false;
        }
    }
    true
}

/// Upper estimate of π(n), used only to size the table allocation.
fn estimate_prime_count(n: u32) -> usize {
    if n < 10 {
        return 4;
    }
    let nf = n as f64;
    (1.3 * nf / nf.ln()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_seventeen_primes() {
        let source = PrimeSource::build(1_000_000);
        assert_eq!(
            &source.primes()[..17],
            &[2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59]
        );
    }

    /// 1-indexed positions 33000..=33002 of the prime sequence.
    #[test]
    fn large_known_primes_by_index() {
        let source = PrimeSource::build(1_000_000);
        assert_eq!(source.nth(33000 - 1), Some(389171));
        assert_eq!(source.nth(33001 - 1), Some(389173));
        assert_eq!(source.nth(33002 - 1), Some(389189));
    }

    #[test]
    fn prime_count_below_one_million() {
        // π(10^6) = 78498
        let source = PrimeSource::build(1_000_000);
        assert_eq!(source.len(), 78_498);
        assert_eq!(source.primes().last(), Some(&999_983));
    }

    #[test]
    fn degenerate_ceilings_are_empty() {
        for ceiling in [0, 1, 2] {
            let source = PrimeSource::build(ceiling);
            assert!(source.is_empty(), "ceiling {} should give no primes", ceiling);
            assert_eq!(source.nth(0), None);
        }
    }

    /// The ceiling is exclusive, including when it is itself prime.
    #[test]
    fn ceiling_is_exclusive() {
        assert_eq!(PrimeSource::build(3).primes(), &[2]);
        assert_eq!(PrimeSource::build(7).primes(), &[2, 3, 5]);
        assert_eq!(PrimeSource::build(8).primes(), &[2, 3, 5, 7]);
        assert_eq!(PrimeSource::build(14).primes(), &[2, 3, 5, 7, 11, 13]);
    }

    #[test]
    fn strictly_ascending() {
        let source = PrimeSource::build(100_000);
        assert!(source.primes().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn nth_past_end_is_none() {
        let source = PrimeSource::build(100);
        assert_eq!(source.len(), 25);
        assert_eq!(source.nth(24), Some(97));
        assert_eq!(source.nth(25), None);
    }

    #[test]
    fn up_to_threshold() {
        let source = PrimeSource::build(1000);
        assert_eq!(source.up_to(10), &[2, 3, 5, 7]);
        assert_eq!(source.up_to(11), &[2, 3, 5, 7, 11]);
        assert_eq!(source.up_to(100).len(), 25);
        assert!(source.up_to(1).is_empty());
    }

    #[test]
    fn exponent_stream_restarts_and_respects_limit() {
        let source = PrimeSource::build(1000);
        let first: Vec<u32> = source.exponents(Some(20)).collect();
        let second: Vec<u32> = source.exponents(Some(20)).collect();
        assert_eq!(first, vec![2, 3, 5, 7, 11, 13, 17, 19]);
        assert_eq!(first, second);
        assert_eq!(source.exponents(None).count(), source.len());
    }

    #[test]
    fn standalone_is_prime_agrees_with_table() {
        let source = PrimeSource::build(20_000);
        let from_table: Vec<u32> = (0..20_000).filter(|&n| is_prime(n)).collect();
        assert_eq!(from_table, source.primes());
        assert!(is_prime(4_294_967_291)); // largest u32 prime
        assert!(!is_prime(u32::MAX));
    }

    #[test]
    fn into_iterator_matches_table() {
        let source = PrimeSource::build(200);
        let collected: Vec<u32> = (&source).into_iter().collect();
        assert_eq!(collected, source.primes());
    }
}
