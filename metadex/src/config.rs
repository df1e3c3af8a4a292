//! Configuration for the definition cache.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default freshness window: 6 hours.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(6 * 60 * 60);

/// Default interval between prune passes: 3 minutes.
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(3 * 60);

/// Default prune threshold: trigrams found in more than 20% of names are dropped.
pub const DEFAULT_PRUNE_THRESHOLD: f64 = 0.20;

/// Tuning knobs for a [`DefCache`](crate::cache::DefCache).
///
/// Durations are (de)serialized as floating-point seconds.
///
/// ```rust
/// use std::time::Duration;
/// use metadex::config::CacheConfig;
///
/// let config = CacheConfig {
///     prune_interval: Duration::from_secs(60),
///     ..CacheConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a definition's `last_update` stays fresh. A data point more
    /// than this far ahead of it triggers a refresh and a write-through.
    #[serde(with = "duration_serde")]
    pub freshness_window: Duration,

    /// How often the background task prunes the pattern index.
    #[serde(with = "duration_serde")]
    pub prune_interval: Duration,

    /// Fraction of live names above which a trigram's posting list is dropped.
    pub prune_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
        }
    }
}

impl CacheConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a duration is zero or the threshold is
    /// outside `(0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.freshness_window.is_zero() {
            return Err(ConfigError::ZeroFreshnessWindow.into());
        }
        if self.prune_interval.is_zero() {
            return Err(ConfigError::ZeroPruneInterval.into());
        }
        if !(self.prune_threshold > 0.0 && self.prune_threshold <= 1.0) {
            return Err(ConfigError::InvalidPruneThreshold {
                threshold: self.prune_threshold,
            }
            .into());
        }
        Ok(())
    }

    /// The freshness window in whole seconds.
    pub fn freshness_secs(&self) -> i64 {
        i64::try_from(self.freshness_window.as_secs()).unwrap_or(i64::MAX)
    }
}

mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(seconds).map_err(serde::de::Error::custom)
    }
}
