//! Transport mode failover
//!
//! When a channel's quality falls below the acceptability threshold during
//! recovery, the controller proposes the first configured candidate mode
//! that is not the one currently failing. Candidate order is configuration
//! order; the controller proposes exactly one mode per invocation and the
//! caller decides whether a further failover is warranted.

use std::time::Duration;

use guildwire_common::Sleeper;
use guildwire_domain::{ChannelId, ConnectionMode, Result};
use tracing::{info, warn};

use crate::events::EngineEvent;
use crate::ports::EventSink;

/// Proposes alternate transport modes for degraded channels
#[derive(Debug, Clone)]
pub struct FailoverController {
    candidates: Vec<ConnectionMode>,
    delay: Duration,
}

impl FailoverController {
    /// Create a controller over the ordered candidate list
    pub fn new(candidates: Vec<ConnectionMode>, delay: Duration) -> Self {
        Self { candidates, delay }
    }

    /// Propose an alternate mode for `channel`, currently on `current`
    ///
    /// Emits `FailoverAttempt` for the chosen candidate, waits the
    /// configured delay through `sleeper`, then emits `FailoverRequired`
    /// and returns the proposed mode. Returns `None` after emitting
    /// `FailoverExhausted` when no candidate other than `current` exists.
    pub async fn run(
        &self,
        channel: &ChannelId,
        current: &ConnectionMode,
        sink: &dyn EventSink,
        sleeper: &dyn Sleeper,
    ) -> Result<Option<ConnectionMode>> {
        let Some(candidate) = self.candidates.iter().find(|mode| *mode != current) else {
            warn!(channel = %channel, mode = %current, "no failover candidates remain");
            sink.emit(EngineEvent::FailoverExhausted { channel: channel.clone() }).await?;
            return Ok(None);
        };

        info!(channel = %channel, from = %current, to = %candidate, "failing over");
        sink.emit(EngineEvent::FailoverAttempt {
            channel: channel.clone(),
            from: current.clone(),
            to: candidate.clone(),
        })
        .await?;

        sleeper.sleep(self.delay).await;

        sink.emit(EngineEvent::FailoverRequired {
            channel: channel.clone(),
            mode: candidate.clone(),
        })
        .await?;

        Ok(Some(candidate.clone()))
    }
}

#[cfg(test)]
mod tests {
    use guildwire_common::NoopSleeper;

    use super::*;
    use crate::ports::RecordingSink;

    fn controller(candidates: &[ConnectionMode]) -> FailoverController {
        FailoverController::new(candidates.to_vec(), Duration::from_millis(5))
    }

    /// Tests the first candidate that is not the current mode wins.
    #[tokio::test]
    async fn test_proposes_first_non_current_candidate() {
        let controller = controller(&[
            ConnectionMode::Plugin,
            ConnectionMode::Rcon,
            ConnectionMode::Terminal,
        ]);
        let sink = RecordingSink::new();
        let channel = ChannelId::from("server-a");

        let proposed = controller
            .run(&channel, &ConnectionMode::Plugin, &sink, &NoopSleeper)
            .await
            .expect("sink never fails");

        assert_eq!(proposed, Some(ConnectionMode::Rcon));
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            EngineEvent::FailoverAttempt { from, to, .. }
                if *from == ConnectionMode::Plugin && *to == ConnectionMode::Rcon
        ));
        assert!(matches!(
            &events[1],
            EngineEvent::FailoverRequired { mode, .. } if *mode == ConnectionMode::Rcon
        ));
    }

    /// Tests the current mode is never proposed even when listed first.
    #[tokio::test]
    async fn test_never_proposes_current_mode() {
        let controller = controller(&[ConnectionMode::Rcon, ConnectionMode::Terminal]);
        let sink = RecordingSink::new();
        let channel = ChannelId::from("server-a");

        let proposed = controller
            .run(&channel, &ConnectionMode::Rcon, &sink, &NoopSleeper)
            .await
            .expect("sink never fails");

        assert_eq!(proposed, Some(ConnectionMode::Terminal));
        assert_eq!(
            sink.count_matching(|e| matches!(
                e,
                EngineEvent::FailoverRequired { mode, .. } if *mode == ConnectionMode::Rcon
            )),
            0
        );
    }

    /// Tests exhaustion when the only candidate is the failing mode.
    #[tokio::test]
    async fn test_exhaustion() {
        let controller = controller(&[ConnectionMode::Plugin]);
        let sink = RecordingSink::new();
        let channel = ChannelId::from("server-a");

        let proposed = controller
            .run(&channel, &ConnectionMode::Plugin, &sink, &NoopSleeper)
            .await
            .expect("sink never fails");

        assert_eq!(proposed, None);
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], EngineEvent::FailoverExhausted { .. }));
    }

    /// Tests an empty candidate list exhausts immediately.
    #[tokio::test]
    async fn test_empty_candidates() {
        let controller = controller(&[]);
        let sink = RecordingSink::new();

        let proposed = controller
            .run(&ChannelId::from("a"), &ConnectionMode::Terminal, &sink, &NoopSleeper)
            .await
            .expect("sink never fails");

        assert_eq!(proposed, None);
    }
}
