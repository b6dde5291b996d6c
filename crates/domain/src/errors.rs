//! Error types used throughout the resilience engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for guildwire
///
/// Nothing in the engine is fatal to the process: every failure path inside
/// the engine terminates in a scheduled retry, a mode switch, or an emitted
/// alert. These variants cover the engine's own boundary (configuration,
/// dispatch, lifecycle), not channel failures.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum EngineError {
    /// The supplied configuration failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// The outbound decision channel is no longer consumable
    #[error("Event sink closed: {0}")]
    SinkClosed(String),

    /// A deferred recovery attempt could not be dispatched
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    /// The engine has been shut down and no longer accepts reports
    #[error("Engine is shut down")]
    ShutDown,
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests error display carries the detail message.
    #[test]
    fn test_error_display() {
        let err = EngineError::Config("bad threshold".to_string());
        assert!(err.to_string().contains("bad threshold"));

        let err = EngineError::ShutDown;
        assert_eq!(err.to_string(), "Engine is shut down");
    }

    /// Tests errors serialize as tagged variants for the caller.
    #[test]
    fn test_error_serde_tagged() {
        let err = EngineError::Scheduling("task rejected".to_string());
        let json = serde_json::to_value(&err).expect("should serialize");
        assert_eq!(json["type"], "Scheduling");
        assert_eq!(json["message"], "task rejected");
    }
}
