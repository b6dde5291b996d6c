//! Domain types for the connection resilience engine
//!
//! A *channel* is one logical connection between the platform and a remote
//! game server, addressed by a stable identifier. These types describe a
//! channel's failure episodes, health snapshots, and the transport modes it
//! can run over.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier for one logical connection to a remote server
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Create a channel identifier from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Transport mode a channel runs over
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// In-process plugin bridge on the game server
    Plugin,
    /// Remote console protocol
    Rcon,
    /// Attached server terminal
    Terminal,
    /// Operator-defined transport not covered by the built-in modes
    Custom(String),
}

impl ConnectionMode {
    /// Parse a mode tag, falling back to `Custom` for unknown values
    pub fn parse(tag: &str) -> Self {
        match tag {
            "plugin" => Self::Plugin,
            "rcon" => Self::Rcon,
            "terminal" => Self::Terminal,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin => f.write_str("plugin"),
            Self::Rcon => f.write_str("rcon"),
            Self::Terminal => f.write_str("terminal"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Category assigned to a failure episode
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Transport-level failures (drops, refusals, timeouts)
    Connection,
    /// Credential and token failures
    Authentication,
    /// Wire-protocol violations reported by the transport
    Protocol,
    /// Domain-semantic failures handled outside this engine
    Business,
    /// Failures of the engine's own machinery (scheduling, dispatch)
    System,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => f.write_str("connection"),
            Self::Authentication => f.write_str("authentication"),
            Self::Protocol => f.write_str("protocol"),
            Self::Business => f.write_str("business"),
            Self::System => f.write_str("system"),
        }
    }
}

/// Internal severity scale for failure episodes
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Cosmetic or informational
    Low,
    /// Degraded but functional
    Medium,
    /// Channel usability at risk
    High,
    /// Channel unusable without intervention
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

/// Severity tag supplied by the caller on protocol errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolSeverity {
    /// Protocol violation that breaks the channel
    Critical,
    /// Serious violation, recoverable if isolated
    Major,
    /// Harmless deviation worth counting
    Minor,
}

impl ProtocolSeverity {
    /// Parse a caller-supplied tag
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "critical" => Some(Self::Critical),
            "major" => Some(Self::Major),
            "minor" => Some(Self::Minor),
            _ => None,
        }
    }

    /// Map the caller tag onto the internal severity scale
    pub fn as_error_severity(self) -> ErrorSeverity {
        match self {
            Self::Critical => ErrorSeverity::Critical,
            Self::Major => ErrorSeverity::High,
            Self::Minor => ErrorSeverity::Medium,
        }
    }
}

impl fmt::Display for ProtocolSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => f.write_str("critical"),
            Self::Major => f.write_str("major"),
            Self::Minor => f.write_str("minor"),
        }
    }
}

/// Parsed reason string attached to an authentication failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailureReason {
    /// Token lifetime elapsed; a refresh can recover the channel
    TokenExpired,
    /// Token rejected as malformed or unknown; manual intervention required
    InvalidToken,
    /// Token explicitly revoked; manual intervention required
    TokenRevoked,
    /// Caller address missing from the server allowlist
    IpNotWhitelisted,
    /// Any other reason string, counted toward the auth alert threshold
    Other(String),
}

impl AuthFailureReason {
    /// Parse a caller-supplied reason string
    pub fn parse(raw: &str) -> Self {
        match raw {
            "token_expired" => Self::TokenExpired,
            "invalid_token" => Self::InvalidToken,
            "token_revoked" => Self::TokenRevoked,
            "ip_not_whitelisted" => Self::IpNotWhitelisted,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Action tags appended to a context as the engine acts on an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// A deferred recovery attempt was scheduled
    RetryScheduled,
    /// The failover controller was invoked
    FailoverStarted,
    /// An operator-facing alert was emitted
    AlertRaised,
    /// Automatic recovery gave up on this episode
    Escalated,
    /// A token refresh was requested from the caller
    TokenRefreshRequested,
    /// An allowlist update was requested from the caller
    WhitelistUpdateRequested,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryScheduled => f.write_str("retry_scheduled"),
            Self::FailoverStarted => f.write_str("failover_started"),
            Self::AlertRaised => f.write_str("alert_raised"),
            Self::Escalated => f.write_str("escalated"),
            Self::TokenRefreshRequested => f.write_str("token_refresh_requested"),
            Self::WhitelistUpdateRequested => f.write_str("whitelist_update_requested"),
        }
    }
}

/// Caller-supplied description of the server a channel connects to
///
/// Its presence is what makes failover possible: without it the engine has
/// no current mode to switch away from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Transport mode the channel is currently using
    pub mode: ConnectionMode,
    /// Optional address for operator-facing output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ServerConfig {
    /// Describe a server reachable over `mode`
    pub fn new(mode: ConnectionMode) -> Self {
        Self { mode, address: None }
    }
}

/// Record of the current failure episode for one channel
///
/// Created on the first failure report for a key and deleted entirely (not
/// reset) the moment a success is reported, or when explicitly cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Channel this episode belongs to
    pub channel: ChannelId,
    /// Category of the most recent failure in the episode
    pub category: ErrorCategory,
    /// Severity of the most recent failure in the episode
    pub severity: ErrorSeverity,
    /// Failures recorded after the one that created the episode
    pub retry_count: u32,
    /// Wall-clock time of the first failure in the episode
    pub first_seen: DateTime<Utc>,
    /// Wall-clock time of the most recent recovery attempt, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_retry_at: Option<DateTime<Utc>>,
    /// Actions the engine has already taken on this episode
    pub recovery_actions: Vec<RecoveryAction>,
    /// Free-form detail; later failures overwrite matching keys
    pub metadata: BTreeMap<String, String>,
}

impl ErrorContext {
    /// Total failure occurrences in this episode, including the first
    pub fn occurrences(&self) -> u32 {
        self.retry_count + 1
    }
}

/// Derived health snapshot for one channel
///
/// Always recomputed from the rolling latency and failure windows; never
/// persisted independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionQuality {
    /// Composite health metric in [0, 100]
    pub score: u8,
    /// Mean of retained latency samples, in milliseconds
    pub average_latency: f64,
    /// Successes over total events within the retained windows, in [0, 1]
    pub success_rate: f64,
    /// Failures retained in the rolling window
    pub failure_count: usize,
    /// Wall-clock time of the most recent retained failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    /// Latency variance factor in [0, 1]; 1.0 means steady
    pub stability: f64,
}

impl ConnectionQuality {
    /// Snapshot for a channel with no recorded history
    ///
    /// New or never-failed channels are optimistically trusted.
    pub fn perfect() -> Self {
        Self {
            score: 100,
            average_latency: 0.0,
            success_rate: 1.0,
            failure_count: 0,
            last_failure: None,
            stability: 1.0,
        }
    }
}

impl Default for ConnectionQuality {
    fn default() -> Self {
        Self::perfect()
    }
}

/// Aggregate error counts for observability dashboards
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStats {
    /// Failure occurrences across all active episodes
    pub total_errors: u64,
    /// Occurrences grouped by category
    pub by_category: BTreeMap<ErrorCategory, u64>,
    /// Occurrences grouped by severity
    pub by_severity: BTreeMap<ErrorSeverity, u64>,
    /// Channels currently holding an error context
    pub active_contexts: usize,
}
