//! # Config — Search Configuration
//!
//! All tunables of a search run. Values come from built-in defaults, then an
//! optional TOML file, then command-line flags (applied by the binary).
//! `validate` runs before any work starts so a bad value aborts the process
//! with no partial state.
//!
//! ```toml
//! batch_size = 100
//! small_prime_ceiling = 1000000
//! hard_factor_ceiling = 4294967296
//! small_factor_threshold = 100
//! threads = 8
//! grace_period_secs = 10
//! max_exponent = 5000
//! status_interval_secs = 30
//! ```

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::mersenne::{FactorLimits, HARD_FACTOR_CEILING, SMALL_FACTOR_THRESHOLD};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_SMALL_PRIME_CEILING: u32 = 1_000_000;
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 10;
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Tests grouped between statistics reports.
    pub batch_size: usize,
    /// Exclusive ceiling of the small-prime table (exponent stream and pre-filter).
    pub small_prime_ceiling: u32,
    /// Absolute cap on the trial-factor search bound.
    pub hard_factor_ceiling: u64,
    /// Largest small prime used by the compositeness pre-filter.
    pub small_factor_threshold: u32,
    /// Worker threads; `None` uses every available core.
    pub threads: Option<usize>,
    /// How long shutdown waits for running tests before giving up on them.
    pub grace_period_secs: u64,
    /// Stop the exponent stream after this exponent.
    pub max_exponent: Option<u32>,
    /// Seconds between progress lines; 0 disables them.
    pub status_interval_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            small_prime_ceiling: DEFAULT_SMALL_PRIME_CEILING,
            hard_factor_ceiling: HARD_FACTOR_CEILING,
            small_factor_threshold: SMALL_FACTOR_THRESHOLD,
            threads: None,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            max_exponent: None,
            status_interval_secs: DEFAULT_STATUS_INTERVAL_SECS,
        }
    }
}

impl SearchConfig {
    /// Parse a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(
            self.small_prime_ceiling > 0,
            "small_prime_ceiling must be positive"
        );
        ensure!(
            self.hard_factor_ceiling >= 2,
            "hard_factor_ceiling must be at least 2, got {}",
            self.hard_factor_ceiling
        );
        ensure!(
            self.threads != Some(0),
            "threads must be positive (omit it to use every core)"
        );
        Ok(())
    }

    pub fn factor_limits(&self) -> FactorLimits {
        FactorLimits {
            hard_ceiling: self.hard_factor_ceiling,
            small_factor_threshold: self.small_factor_threshold,
        }
    }

    /// Pool size: configured threads, else available parallelism, at least 1.
    pub fn worker_threads(&self) -> usize {
        self.threads
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_secs > 0).then(|| Duration::from_secs(self.status_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = SearchConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.small_prime_ceiling, 1_000_000);
        assert_eq!(config.hard_factor_ceiling, 1 << 32);
        assert_eq!(config.small_factor_threshold, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SearchConfig::from_toml("batch_size = 25\nthreads = 2\n").unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.threads, Some(2));
        assert_eq!(config.small_prime_ceiling, DEFAULT_SMALL_PRIME_CEILING);
        assert_eq!(config.worker_threads(), 2);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(SearchConfig::from_toml("").unwrap(), SearchConfig::default());
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(SearchConfig::from_toml("batch_sise = 25\n").is_err());
    }

    #[test]
    fn negative_values_fail_to_parse() {
        assert!(SearchConfig::from_toml("batch_size = -1\n").is_err());
        assert!(SearchConfig::from_toml("small_prime_ceiling = -5\n").is_err());
    }

    #[test]
    fn zero_values_fail_validation() {
        let cases = [
            SearchConfig {
                batch_size: 0,
                ..SearchConfig::default()
            },
            SearchConfig {
                small_prime_ceiling: 0,
                ..SearchConfig::default()
            },
            SearchConfig {
                hard_factor_ceiling: 1,
                ..SearchConfig::default()
            },
            SearchConfig {
                threads: Some(0),
                ..SearchConfig::default()
            },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_size = 7\nmax_exponent = 500\nstatus_interval_secs = 0").unwrap();
        let config = SearchConfig::load(file.path()).unwrap();
        assert_eq!(config.batch_size, 7);
        assert_eq!(config.max_exponent, Some(500));
        assert_eq!(config.status_interval(), None);
    }

    #[test]
    fn load_missing_file_names_the_path() {
        let err = SearchConfig::load(Path::new("/nonexistent/mersenne.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/mersenne.toml"));
    }

    #[test]
    fn worker_threads_at_least_one() {
        assert!(SearchConfig::default().worker_threads() >= 1);
    }

    #[test]
    fn factor_limits_follow_config() {
        let config = SearchConfig {
            hard_factor_ceiling: 1 << 20,
            small_factor_threshold: 50,
            ..SearchConfig::default()
        };
        let limits = config.factor_limits();
        assert_eq!(limits.hard_ceiling, 1 << 20);
        assert_eq!(limits.small_factor_threshold, 50);
    }
}
