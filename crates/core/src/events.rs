//! Outbound decision vocabulary
//!
//! Every decision the engine makes surfaces as one of these events. They are
//! one-way notifications: the transport layer executes them and later
//! reports the outcome back through the normal success/failure path.

use guildwire_domain::{ChannelId, ConnectionMode, ErrorContext};
use serde::{Deserialize, Serialize};

/// Decision emitted by the resilience engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A recovery attempt is being made for the channel
    RecoveryAttempt {
        /// Channel under recovery
        channel: ChannelId,
        /// 1-based attempt number within the current episode
        attempt: u32,
    },
    /// Reconnect on the current transport mode
    RetryConnection {
        /// Channel to reconnect
        channel: ChannelId,
    },
    /// The engine is evaluating a switch to an alternate mode
    FailoverAttempt {
        /// Channel being failed over
        channel: ChannelId,
        /// Mode being abandoned
        from: ConnectionMode,
        /// Candidate mode under consideration
        to: ConnectionMode,
    },
    /// Switch the channel to the named mode now
    FailoverRequired {
        /// Channel to switch
        channel: ChannelId,
        /// Mode to switch to
        mode: ConnectionMode,
    },
    /// No alternate modes remain for the channel
    FailoverExhausted {
        /// Channel with no candidates left
        channel: ChannelId,
    },
    /// Automatic recovery has given up on the channel
    ConnectionFailed {
        /// Channel that could not be recovered
        channel: ChannelId,
        /// Full episode record at the point of giving up
        context: ErrorContext,
    },
    /// Operator attention is required immediately
    CriticalAlert {
        /// Channel the alert concerns
        channel: ChannelId,
        /// Human-readable cause
        reason: String,
        /// Full episode record backing the alert
        context: ErrorContext,
    },
    /// The caller should refresh the channel's token and reconnect
    TokenRefreshRequired {
        /// Channel whose token expired
        channel: ChannelId,
    },
    /// The caller should update the server allowlist
    IpWhitelistUpdateRequired {
        /// Channel rejected by the allowlist
        channel: ChannelId,
    },
    /// Authentication cannot recover without manual intervention
    AuthenticationCritical {
        /// Channel with the revoked or invalid token
        channel: ChannelId,
        /// Full episode record
        context: ErrorContext,
    },
    /// Repeated unclassified authentication failures
    AuthAlert {
        /// Channel accumulating auth failures
        channel: ChannelId,
        /// Unclassified auth failures counted so far in the episode
        count: u32,
    },
    /// Repeated minor protocol errors
    ProtocolAlert {
        /// Channel accumulating protocol errors
        channel: ChannelId,
        /// Minor protocol errors counted so far in the episode
        count: u32,
    },
}

impl EngineEvent {
    /// Channel the event concerns
    pub fn channel(&self) -> &ChannelId {
        match self {
            Self::RecoveryAttempt { channel, .. }
            | Self::RetryConnection { channel }
            | Self::FailoverAttempt { channel, .. }
            | Self::FailoverRequired { channel, .. }
            | Self::FailoverExhausted { channel }
            | Self::ConnectionFailed { channel, .. }
            | Self::CriticalAlert { channel, .. }
            | Self::TokenRefreshRequired { channel }
            | Self::IpWhitelistUpdateRequired { channel }
            | Self::AuthenticationCritical { channel, .. }
            | Self::AuthAlert { channel, .. }
            | Self::ProtocolAlert { channel, .. } => channel,
        }
    }

    /// Short tag for structured logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RecoveryAttempt { .. } => "recovery_attempt",
            Self::RetryConnection { .. } => "retry_connection",
            Self::FailoverAttempt { .. } => "failover_attempt",
            Self::FailoverRequired { .. } => "failover_required",
            Self::FailoverExhausted { .. } => "failover_exhausted",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::CriticalAlert { .. } => "critical_alert",
            Self::TokenRefreshRequired { .. } => "token_refresh_required",
            Self::IpWhitelistUpdateRequired { .. } => "ip_whitelist_update_required",
            Self::AuthenticationCritical { .. } => "authentication_critical",
            Self::AuthAlert { .. } => "auth_alert",
            Self::ProtocolAlert { .. } => "protocol_alert",
        }
    }
}
