//! Engine configuration
//!
//! Supplied by the host process at construction; the engine performs no
//! configuration loading of its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::types::ConnectionMode;
use crate::utils::duration_millis;

/// Occurrence counts at which category-specific alerts are raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Connection failures before a connection alert
    pub connection_failures: u32,
    /// Unclassified authentication failures before an auth alert
    pub auth_failures: u32,
    /// Minor protocol errors before a protocol alert
    pub protocol_errors: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self { connection_failures: 5, auth_failures: 3, protocol_errors: 10 }
    }
}

/// Configuration for the resilience engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Recovery attempts allowed per episode before escalation
    pub max_retry_attempts: u32,
    /// Delay before the first recovery attempt
    #[serde(with = "duration_millis")]
    pub base_retry_interval: Duration,
    /// Upper bound on any recovery delay
    #[serde(with = "duration_millis")]
    pub max_retry_interval: Duration,
    /// Exponential growth factor between recovery delays
    pub backoff_multiplier: f64,
    /// Whether recovery delays carry up to 10% random jitter
    pub jitter_enabled: bool,
    /// Minimum quality score considered acceptable, in [0, 100]
    pub quality_threshold: u8,
    /// Average latency (milliseconds) above which the score is penalized
    pub latency_threshold: f64,
    /// Whether the engine may propose alternate transport modes
    pub failover_enabled: bool,
    /// Candidate modes in preference order
    pub failover_modes: Vec<ConnectionMode>,
    /// Pause between announcing a failover attempt and requiring the switch
    #[serde(with = "duration_millis")]
    pub failover_delay: Duration,
    /// Whether operator-facing alerts are emitted at all
    pub alerts_enabled: bool,
    /// Per-category alert thresholds
    pub alert_thresholds: AlertThresholds,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 5,
            base_retry_interval: Duration::from_millis(1000),
            max_retry_interval: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_enabled: true,
            quality_threshold: 70,
            latency_threshold: 1000.0,
            failover_enabled: true,
            failover_modes: vec![
                ConnectionMode::Plugin,
                ConnectionMode::Rcon,
                ConnectionMode::Terminal,
            ],
            failover_delay: Duration::from_secs(5),
            alerts_enabled: true,
            alert_thresholds: AlertThresholds::default(),
        }
    }
}

impl ResilienceConfig {
    /// Create a configuration builder
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_retry_attempts == 0 {
            return Err(EngineError::Config(
                "max_retry_attempts must be greater than 0".to_string(),
            ));
        }

        if self.backoff_multiplier <= 0.0 {
            return Err(EngineError::Config(
                "backoff_multiplier must be greater than 0".to_string(),
            ));
        }

        if self.base_retry_interval > self.max_retry_interval {
            return Err(EngineError::Config(
                "base_retry_interval cannot exceed max_retry_interval".to_string(),
            ));
        }

        if self.quality_threshold > 100 {
            return Err(EngineError::Config(
                "quality_threshold must be within 0..=100".to_string(),
            ));
        }

        if self.latency_threshold < 0.0 {
            return Err(EngineError::Config(
                "latency_threshold cannot be negative".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`ResilienceConfig`] with fluent API
#[derive(Debug, Default)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    /// Create a builder seeded with the default configuration
    pub fn new() -> Self {
        Self { config: ResilienceConfig::default() }
    }

    /// Set the recovery attempts allowed per episode
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.max_retry_attempts = attempts;
        self
    }

    /// Set the delay before the first recovery attempt
    pub fn base_retry_interval(mut self, interval: Duration) -> Self {
        self.config.base_retry_interval = interval;
        self
    }

    /// Set the upper bound on recovery delays
    pub fn max_retry_interval(mut self, interval: Duration) -> Self {
        self.config.max_retry_interval = interval;
        self
    }

    /// Set the exponential growth factor
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable delay jitter
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.jitter_enabled = enabled;
        self
    }

    /// Set the minimum acceptable quality score
    pub fn quality_threshold(mut self, threshold: u8) -> Self {
        self.config.quality_threshold = threshold;
        self
    }

    /// Set the latency penalty threshold in milliseconds
    pub fn latency_threshold(mut self, threshold: f64) -> Self {
        self.config.latency_threshold = threshold;
        self
    }

    /// Enable or disable failover
    pub fn failover_enabled(mut self, enabled: bool) -> Self {
        self.config.failover_enabled = enabled;
        self
    }

    /// Set the candidate modes in preference order
    pub fn failover_modes(mut self, modes: Vec<ConnectionMode>) -> Self {
        self.config.failover_modes = modes;
        self
    }

    /// Set the inter-attempt failover delay
    pub fn failover_delay(mut self, delay: Duration) -> Self {
        self.config.failover_delay = delay;
        self
    }

    /// Enable or disable operator-facing alerts
    pub fn alerts_enabled(mut self, enabled: bool) -> Self {
        self.config.alerts_enabled = enabled;
        self
    }

    /// Set the per-category alert thresholds
    pub fn alert_thresholds(mut self, thresholds: AlertThresholds) -> Self {
        self.config.alert_thresholds = thresholds;
        self
    }

    /// Validate and produce the configuration
    pub fn build(self) -> Result<ResilienceConfig, EngineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests default values are production-sensible and valid.
    #[test]
    fn test_default_config_is_valid() {
        let config = ResilienceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_retry_attempts, 5);
        assert_eq!(config.base_retry_interval, Duration::from_millis(1000));
        assert!(config.failover_enabled);
        assert_eq!(config.failover_modes.len(), 3);
    }

    /// Tests builder pattern for engine configuration.
    #[test]
    fn test_config_builder() {
        let config = ResilienceConfig::builder()
            .max_retry_attempts(3)
            .base_retry_interval(Duration::from_millis(500))
            .backoff_multiplier(1.5)
            .jitter(false)
            .quality_threshold(80)
            .failover_modes(vec![ConnectionMode::Rcon, ConnectionMode::Terminal])
            .build()
            .expect("valid config should build");

        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.base_retry_interval, Duration::from_millis(500));
        assert!(!config.jitter_enabled);
        assert_eq!(config.quality_threshold, 80);
        assert_eq!(config.failover_modes, vec![ConnectionMode::Rcon, ConnectionMode::Terminal]);
    }

    /// Tests validation rejects invalid configurations.
    #[test]
    fn test_config_validation_fails() {
        assert!(ResilienceConfig::builder().max_retry_attempts(0).build().is_err());
        assert!(ResilienceConfig::builder().backoff_multiplier(0.0).build().is_err());
        assert!(ResilienceConfig::builder()
            .base_retry_interval(Duration::from_secs(60))
            .max_retry_interval(Duration::from_secs(1))
            .build()
            .is_err());
        assert!(ResilienceConfig::builder().latency_threshold(-1.0).build().is_err());
    }

    /// Tests interval fields serialize as millisecond counts.
    #[test]
    fn test_config_serializes_durations_as_millis() {
        let config = ResilienceConfig::default();
        let json = serde_json::to_value(&config).expect("should serialize");

        assert_eq!(json["base_retry_interval"], 1000);
        assert_eq!(json["max_retry_interval"], 30_000);
        assert_eq!(json["failover_delay"], 5000);
    }
}
