//! Per-channel error episode records
//!
//! One [`ErrorContext`] exists per channel while that channel is failing.
//! It is created on the first failure, enriched as the episode evolves, and
//! deleted outright on recovery. Histories never survive a successful
//! reconnect, so a channel that heals starts its next episode clean.

use std::collections::BTreeMap;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use guildwire_domain::{
    ChannelId, ErrorCategory, ErrorContext, ErrorSeverity, RecoveryAction,
};
use tracing::debug;

/// Failure kinds tallied separately within an episode
///
/// Alert thresholds compare against the running count of one kind, not the
/// episode's total occurrences, so an episode mixing categories cannot jump
/// past a kind's threshold without its alert firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureKind {
    /// Transport-level connection failures
    Connection,
    /// Authentication failures whose reason matched no known branch
    AuthUnclassified,
    /// Minor protocol violations
    ProtocolMinor,
}

#[derive(Debug, Default, Clone, Copy)]
struct KindTally {
    count: u32,
    alerted: bool,
}

/// Concurrent store of active error episodes
#[derive(Debug, Default)]
pub struct ErrorContextStore {
    contexts: DashMap<ChannelId, ErrorContext>,
    tallies: DashMap<ChannelId, BTreeMap<FailureKind, KindTally>>,
}

impl ErrorContextStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure for `channel` and return the updated context
    ///
    /// The first failure opens the episode with a retry count of zero.
    /// Subsequent failures bump the count, adopt the latest category and
    /// severity, and merge `metadata` key by key so later values win
    /// without discarding earlier keys. `first_seen` is never touched
    /// after the episode opens.
    pub fn note_failure(
        &self,
        channel: &ChannelId,
        category: ErrorCategory,
        severity: ErrorSeverity,
        metadata: impl IntoIterator<Item = (String, String)>,
    ) -> ErrorContext {
        let mut entry = match self.contexts.entry(channel.clone()) {
            Entry::Occupied(mut occupied) => {
                let ctx = occupied.get_mut();
                ctx.retry_count += 1;
                ctx.category = category;
                ctx.severity = severity;
                occupied.into_ref()
            }
            Entry::Vacant(vacant) => {
                debug!(channel = %channel, %category, %severity, "opening error episode");
                vacant.insert(ErrorContext {
                    channel: channel.clone(),
                    category,
                    severity,
                    retry_count: 0,
                    first_seen: Utc::now(),
                    last_retry_at: None,
                    recovery_actions: Vec::new(),
                    metadata: Default::default(),
                })
            }
        };

        for (key, value) in metadata {
            entry.metadata.insert(key, value);
        }
        entry.value().clone()
    }

    /// Count one failure of `kind` for `channel`, returning the running total
    ///
    /// Tallies live and die with the episode: `clear` discards them along
    /// with the context.
    pub fn bump_kind(&self, channel: &ChannelId, kind: FailureKind) -> u32 {
        let mut tallies = self.tallies.entry(channel.clone()).or_default();
        let tally = tallies.entry(kind).or_default();
        tally.count += 1;
        tally.count
    }

    /// Claim the one-shot alert for `kind`, true only for the first claim
    pub fn mark_alerted(&self, channel: &ChannelId, kind: FailureKind) -> bool {
        let mut tallies = self.tallies.entry(channel.clone()).or_default();
        let tally = tallies.entry(kind).or_default();
        if tally.alerted {
            false
        } else {
            tally.alerted = true;
            true
        }
    }

    /// Append `action` to the episode's action tags if not already present
    pub fn push_action(&self, channel: &ChannelId, action: RecoveryAction) {
        if let Some(mut entry) = self.contexts.get_mut(channel) {
            if !entry.recovery_actions.contains(&action) {
                entry.recovery_actions.push(action);
            }
        }
    }

    /// Replace the episode's action tags wholesale
    pub fn set_actions(&self, channel: &ChannelId, actions: Vec<RecoveryAction>) {
        if let Some(mut entry) = self.contexts.get_mut(channel) {
            entry.recovery_actions = actions;
        }
    }

    /// Stamp the episode with the wall-clock time of the latest retry
    pub fn set_last_retry(&self, channel: &ChannelId) {
        if let Some(mut entry) = self.contexts.get_mut(channel) {
            entry.last_retry_at = Some(Utc::now());
        }
    }

    /// Attach or overwrite one metadata key on the episode
    pub fn insert_metadata(&self, channel: &ChannelId, key: &str, value: &str) {
        if let Some(mut entry) = self.contexts.get_mut(channel) {
            entry.metadata.insert(key.to_owned(), value.to_owned());
        }
    }

    /// Close the episode for `channel`, returning it if one was open
    pub fn clear(&self, channel: &ChannelId) -> Option<ErrorContext> {
        self.tallies.remove(channel);
        let removed = self.contexts.remove(channel).map(|(_, ctx)| ctx);
        if removed.is_some() {
            debug!(channel = %channel, "closing error episode");
        }
        removed
    }

    /// Current episode for `channel`, if any
    pub fn get(&self, channel: &ChannelId) -> Option<ErrorContext> {
        self.contexts.get(channel).map(|entry| entry.value().clone())
    }

    /// Whether an episode is open for `channel`
    pub fn contains(&self, channel: &ChannelId) -> bool {
        self.contexts.contains_key(channel)
    }

    /// Snapshot of every open episode
    pub fn snapshot(&self) -> Vec<ErrorContext> {
        self.contexts.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of open episodes
    pub fn active_count(&self) -> usize {
        self.contexts.len()
    }

    /// Channels with an open episode
    pub fn active_channels(&self) -> Vec<ChannelId> {
        self.contexts.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Close every episode
    pub fn clear_all(&self) {
        self.tallies.clear();
        self.contexts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    /// Tests the first failure opens an episode with a zero retry count.
    #[test]
    fn test_first_failure_opens_episode() {
        let store = ErrorContextStore::new();
        let channel = ChannelId::from("server-a");

        let ctx = store.note_failure(
            &channel,
            ErrorCategory::Connection,
            ErrorSeverity::High,
            meta(&[("cause", "timeout")]),
        );

        assert_eq!(ctx.retry_count, 0);
        assert_eq!(ctx.occurrences(), 1);
        assert_eq!(ctx.category, ErrorCategory::Connection);
        assert_eq!(ctx.metadata.get("cause").map(String::as_str), Some("timeout"));
        assert!(ctx.recovery_actions.is_empty());
        assert!(store.contains(&channel));
    }

    /// Tests repeated failures adopt the latest classification and merge
    /// metadata key by key.
    #[test]
    fn test_repeat_failure_reclassifies_and_merges() {
        let store = ErrorContextStore::new();
        let channel = ChannelId::from("server-a");

        store.note_failure(
            &channel,
            ErrorCategory::Connection,
            ErrorSeverity::Medium,
            meta(&[("cause", "timeout"), ("host", "10.0.0.1")]),
        );
        let ctx = store.note_failure(
            &channel,
            ErrorCategory::Protocol,
            ErrorSeverity::High,
            meta(&[("cause", "bad frame")]),
        );

        assert_eq!(ctx.category, ErrorCategory::Protocol);
        assert_eq!(ctx.severity, ErrorSeverity::High);
        assert_eq!(ctx.metadata.get("cause").map(String::as_str), Some("bad frame"));
        assert_eq!(ctx.metadata.get("host").map(String::as_str), Some("10.0.0.1"));
    }

    /// Tests repeated failures bump the count but keep first_seen.
    #[test]
    fn test_repeat_failures_bump_retry_count() {
        let store = ErrorContextStore::new();
        let channel = ChannelId::from("server-a");

        let first = store.note_failure(
            &channel,
            ErrorCategory::Connection,
            ErrorSeverity::High,
            meta(&[]),
        );
        let second =
            store.note_failure(&channel, ErrorCategory::Connection, ErrorSeverity::High, meta(&[]));
        let third =
            store.note_failure(&channel, ErrorCategory::Connection, ErrorSeverity::High, meta(&[]));

        assert_eq!(second.retry_count, 1);
        assert_eq!(third.retry_count, 2);
        assert_eq!(third.occurrences(), 3);
        assert_eq!(third.first_seen, first.first_seen);
    }

    /// Tests action tags append once and can be replaced wholesale.
    #[test]
    fn test_action_tags() {
        let store = ErrorContextStore::new();
        let channel = ChannelId::from("server-a");
        store.note_failure(&channel, ErrorCategory::System, ErrorSeverity::High, meta(&[]));

        store.push_action(&channel, RecoveryAction::RetryScheduled);
        store.push_action(&channel, RecoveryAction::RetryScheduled);
        store.push_action(&channel, RecoveryAction::FailoverStarted);

        let ctx = store.get(&channel).expect("episode open");
        assert_eq!(
            ctx.recovery_actions,
            vec![RecoveryAction::RetryScheduled, RecoveryAction::FailoverStarted]
        );

        store.set_actions(
            &channel,
            vec![RecoveryAction::AlertRaised, RecoveryAction::Escalated],
        );
        let ctx = store.get(&channel).expect("episode open");
        assert_eq!(
            ctx.recovery_actions,
            vec![RecoveryAction::AlertRaised, RecoveryAction::Escalated]
        );
    }

    /// Tests clearing deletes the episode rather than resetting it.
    #[test]
    fn test_clear_deletes_episode() {
        let store = ErrorContextStore::new();
        let channel = ChannelId::from("server-a");
        store.note_failure(&channel, ErrorCategory::Connection, ErrorSeverity::High, meta(&[]));
        store.note_failure(&channel, ErrorCategory::Connection, ErrorSeverity::High, meta(&[]));

        let removed = store.clear(&channel).expect("episode was open");
        assert_eq!(removed.retry_count, 1);
        assert!(!store.contains(&channel));
        assert!(store.clear(&channel).is_none());

        // A fresh failure after clearing starts from zero again.
        let ctx = store.note_failure(
            &channel,
            ErrorCategory::Connection,
            ErrorSeverity::High,
            meta(&[]),
        );
        assert_eq!(ctx.retry_count, 0);
    }

    /// Tests snapshot and channel listing reflect only open episodes.
    #[test]
    fn test_snapshot_and_active_channels() {
        let store = ErrorContextStore::new();
        store.note_failure(
            &ChannelId::from("a"),
            ErrorCategory::Connection,
            ErrorSeverity::High,
            meta(&[]),
        );
        store.note_failure(
            &ChannelId::from("b"),
            ErrorCategory::Authentication,
            ErrorSeverity::Critical,
            meta(&[]),
        );

        assert_eq!(store.active_count(), 2);
        assert_eq!(store.snapshot().len(), 2);

        let mut channels = store.active_channels();
        channels.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(channels, vec![ChannelId::from("a"), ChannelId::from("b")]);

        store.clear_all();
        assert_eq!(store.active_count(), 0);
    }

    /// Tests per-kind tallies count independently of the episode total and
    /// reset when the episode closes.
    #[test]
    fn test_kind_tallies() {
        let store = ErrorContextStore::new();
        let channel = ChannelId::from("server-a");

        store.note_failure(&channel, ErrorCategory::Connection, ErrorSeverity::High, meta(&[]));
        assert_eq!(store.bump_kind(&channel, FailureKind::Connection), 1);

        store.note_failure(
            &channel,
            ErrorCategory::Authentication,
            ErrorSeverity::High,
            meta(&[]),
        );
        assert_eq!(store.bump_kind(&channel, FailureKind::AuthUnclassified), 1);
        assert_eq!(store.bump_kind(&channel, FailureKind::AuthUnclassified), 2);
        // The connection tally is unaffected by the auth failures.
        assert_eq!(store.bump_kind(&channel, FailureKind::Connection), 2);

        assert!(store.mark_alerted(&channel, FailureKind::AuthUnclassified));
        assert!(!store.mark_alerted(&channel, FailureKind::AuthUnclassified));
        // A different kind's alert is still unclaimed.
        assert!(store.mark_alerted(&channel, FailureKind::Connection));

        store.clear(&channel);
        assert_eq!(store.bump_kind(&channel, FailureKind::AuthUnclassified), 1);
        assert!(store.mark_alerted(&channel, FailureKind::AuthUnclassified));
    }

    /// Tests last-retry stamping and metadata insertion on open episodes.
    #[test]
    fn test_stamp_and_metadata() {
        let store = ErrorContextStore::new();
        let channel = ChannelId::from("server-a");
        store.note_failure(&channel, ErrorCategory::Connection, ErrorSeverity::High, meta(&[]));

        store.set_last_retry(&channel);
        store.insert_metadata(&channel, "failover_mode", "rcon");

        let ctx = store.get(&channel).expect("episode open");
        assert!(ctx.last_retry_at.is_some());
        assert_eq!(ctx.metadata.get("failover_mode").map(String::as_str), Some("rcon"));

        // No-ops on channels without an open episode.
        store.set_last_retry(&ChannelId::from("missing"));
        store.insert_metadata(&ChannelId::from("missing"), "k", "v");
        assert!(store.get(&ChannelId::from("missing")).is_none());
    }
}
