//! # Guildwire Domain
//!
//! Domain types and models for the connection resilience engine.
//!
//! This crate contains:
//! - Channel and connection-mode identifiers
//! - The failure taxonomy (categories, severities, auth reasons)
//! - Error context and quality snapshot records
//! - Engine configuration with validated builder
//! - Engine error types and Result definitions
//!
//! ## Architecture
//! - No dependencies on other guildwire crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod errors;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::{AlertThresholds, ResilienceConfig, ResilienceConfigBuilder};
pub use errors::{EngineError, Result};
pub use types::{
    AuthFailureReason, ChannelId, ConnectionMode, ConnectionQuality, ErrorCategory, ErrorContext,
    ErrorSeverity, ErrorStats, ProtocolSeverity, RecoveryAction, ServerConfig,
};
