//! Keyed exponential backoff scheduler
//!
//! Tracks retry attempts per opaque key and computes the delay before the
//! next attempt as `min(base * multiplier^attempts, max)`, optionally with
//! up to 10% additive jitter. Computing a delay is side-effect-free; only
//! `record_attempt` advances the stored attempt count, so callers may query
//! delays speculatively.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

/// Fraction of the computed delay used as the jitter ceiling.
const JITTER_FACTOR: f64 = 0.10;

/// Errors produced by backoff configuration validation
#[derive(Debug, Error)]
pub enum BackoffError {
    /// The scheduler configuration is invalid
    #[error("Invalid backoff configuration: {message}")]
    InvalidConfiguration {
        /// Description of the offending field
        message: String,
    },
}

/// Configuration for the backoff scheduler
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub base_interval: Duration,
    /// Upper bound on any computed delay
    pub max_interval: Duration,
    /// Exponential growth factor applied per recorded attempt
    pub multiplier: f64,
    /// Attempt ceiling consulted by `attempts_exceeded`
    pub max_attempts: u32,
    /// Whether to add up to 10% random jitter to each delay
    pub jitter_enabled: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(1000),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
            jitter_enabled: true,
        }
    }
}

impl BackoffConfig {
    /// Create a configuration builder
    pub fn builder() -> BackoffConfigBuilder {
        BackoffConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), BackoffError> {
        if self.max_attempts == 0 {
            return Err(BackoffError::InvalidConfiguration {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        if self.multiplier <= 0.0 {
            return Err(BackoffError::InvalidConfiguration {
                message: "multiplier must be greater than 0".to_string(),
            });
        }

        if self.base_interval > self.max_interval {
            return Err(BackoffError::InvalidConfiguration {
                message: "base_interval cannot exceed max_interval".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for [`BackoffConfig`] with fluent API
#[derive(Debug)]
pub struct BackoffConfigBuilder {
    config: BackoffConfig,
}

impl Default for BackoffConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffConfigBuilder {
    /// Create a builder seeded with the default configuration
    pub fn new() -> Self {
        Self { config: BackoffConfig::default() }
    }

    /// Set the delay before the first retry
    pub fn base_interval(mut self, interval: Duration) -> Self {
        self.config.base_interval = interval;
        self
    }

    /// Set the upper bound on any computed delay
    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.config.max_interval = interval;
        self
    }

    /// Set the exponential growth factor
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.config.multiplier = multiplier;
        self
    }

    /// Set the attempt ceiling
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Enable or disable jitter
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.jitter_enabled = enabled;
        self
    }

    /// Validate and produce the configuration
    pub fn build(self) -> Result<BackoffConfig, BackoffError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Per-key retry bookkeeping
#[derive(Debug, Clone)]
struct RetryState {
    attempts: u32,
    last_attempt_at: Instant,
}

/// Keyed exponential backoff scheduler
///
/// Keys are opaque strings; the scheduler has no knowledge of what they
/// identify. State for a key is created on the first `record_attempt` and
/// removed by `reset`.
#[derive(Debug)]
pub struct BackoffScheduler {
    config: BackoffConfig,
    states: Mutex<HashMap<String, RetryState>>,
}

impl BackoffScheduler {
    /// Create a scheduler with a validated configuration
    pub fn new(config: BackoffConfig) -> Result<Self, BackoffError> {
        config.validate()?;
        Ok(Self { config, states: Mutex::new(HashMap::new()) })
    }

    /// Compute the delay before the next attempt for `key`
    ///
    /// Pure with respect to scheduler state: the stored attempt count is not
    /// advanced. With jitter disabled the result is exactly
    /// `min(base * multiplier^attempts, max)` floored to whole milliseconds.
    pub fn delay(&self, key: &str) -> Duration {
        let attempts = self.attempt_count(key);
        let base_ms = self.config.base_interval.as_millis() as f64;
        let max_ms = self.config.max_interval.as_millis() as f64;

        let mut delay_ms = (base_ms * self.config.multiplier.powi(attempts as i32)).min(max_ms);

        if self.config.jitter_enabled {
            delay_ms += delay_ms * JITTER_FACTOR * rand::thread_rng().gen_range(0.0..1.0);
        }

        Duration::from_millis(delay_ms.floor() as u64)
    }

    /// Record that an attempt was made for `key`, advancing its count
    pub fn record_attempt(&self, key: &str) {
        let mut states = self.states.lock();
        let state = states
            .entry(key.to_string())
            .or_insert_with(|| RetryState { attempts: 0, last_attempt_at: Instant::now() });
        state.attempts += 1;
        state.last_attempt_at = Instant::now();
        debug!(key, attempts = state.attempts, "recorded backoff attempt");
    }

    /// Discard all retry state for `key`
    pub fn reset(&self, key: &str) {
        if self.states.lock().remove(key).is_some() {
            debug!(key, "backoff state reset");
        }
    }

    /// Whether the recorded attempt count for `key` has reached the ceiling
    ///
    /// The scheduler only exposes the comparison; deciding when to stop
    /// retrying is the caller's responsibility.
    pub fn attempts_exceeded(&self, key: &str) -> bool {
        self.attempt_count(key) >= self.config.max_attempts
    }

    /// Number of attempts recorded for `key` (zero if unknown)
    pub fn attempt_count(&self, key: &str) -> u32 {
        self.states.lock().get(key).map_or(0, |s| s.attempts)
    }

    /// Instant of the most recent recorded attempt for `key`
    pub fn last_attempt_at(&self, key: &str) -> Option<Instant> {
        self.states.lock().get(key).map(|s| s.last_attempt_at)
    }

    /// Drop state for every key (used at shutdown)
    pub fn clear_all(&self) {
        self.states.lock().clear();
    }
}
