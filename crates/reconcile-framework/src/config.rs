//! # Dispatcher Configuration
//!
//! [`DispatcherConfig`] collects every tunable of the dispatcher. It deserializes from
//! TOML with defaults for every missing key:
//!
//! ```toml
//! worker_count = 4
//! base_retry_delay_ms = 1000
//! max_retry_delay_ms = 60000
//! max_attempts = 5
//! resync_period_ms = 0      # 0 disables periodic resync
//! drain_timeout_ms = 30000
//! max_pending = 10000       # optional bound on tracked identities
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("worker_count must be at least 1")]
    NoWorkers,
    #[error("max_attempts must be at least 1")]
    NoAttempts,
    #[error("base_retry_delay_ms ({base}) exceeds max_retry_delay_ms ({max})")]
    DelayRange { base: u64, max: u64 },
    #[error("max_pending must be at least 1")]
    NoCapacity,
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tunables for the event buffer, worker pool and retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub worker_count: usize,
    pub base_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub max_attempts: u32,
    pub resync_period_ms: u64,
    pub max_pending: Option<usize>,
    pub drain_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            base_retry_delay_ms: 1_000,
            max_retry_delay_ms: 60_000,
            max_attempts: 5,
            resync_period_ms: 0,
            max_pending: None,
            drain_timeout_ms: 30_000,
        }
    }
}

impl DispatcherConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.base_retry_delay_ms > self.max_retry_delay_ms {
            return Err(ConfigError::DelayRange {
                base: self.base_retry_delay_ms,
                max: self.max_retry_delay_ms,
            });
        }
        if self.max_pending == Some(0) {
            return Err(ConfigError::NoCapacity);
        }
        Ok(())
    }

    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_retry_delay_ms = duration_ms(base);
        self.max_retry_delay_ms = duration_ms(max);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_resync_period(mut self, period: Duration) -> Self {
        self.resync_period_ms = duration_ms(period);
        self
    }

    pub fn with_max_pending(mut self, bound: usize) -> Self {
        self.max_pending = Some(bound);
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// `None` when periodic resync is disabled.
    pub fn resync_period(&self) -> Option<Duration> {
        (self.resync_period_ms > 0).then(|| Duration::from_millis(self.resync_period_ms))
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
