//! Recovery orchestration
//!
//! [`ResilienceEngine`] is the public facade. The transport layer reports
//! connection, authentication, and protocol failures plus successes; the
//! engine classifies each report, keeps the per-channel episode record
//! current, consults the backoff scheduler for timing and the quality
//! monitor for a go/no-go on the current transport mode, and emits its
//! decisions through the configured [`EventSink`].
//!
//! Per-channel state lives behind a per-key async mutex so reports for the
//! same channel are serialized while different channels never contend. A
//! deferred recovery attempt holds a cancellation flag and re-validates
//! both the flag and the episode's existence when it fires, so a success
//! report that lands first turns the pending attempt into a no-op.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use guildwire_common::{
    BackoffConfig, BackoffScheduler, Clock, NoopSleeper, Sleeper, SystemClock, TokioSleeper,
};
use guildwire_domain::{
    AuthFailureReason, ChannelId, ConnectionQuality, EngineError, ErrorCategory, ErrorContext,
    ErrorSeverity, ErrorStats, ProtocolSeverity, RecoveryAction, ResilienceConfig, Result,
    ServerConfig,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::context::{ErrorContextStore, FailureKind};
use crate::events::EngineEvent;
use crate::failover::FailoverController;
use crate::ports::EventSink;
use crate::quality::QualityMonitor;
use crate::stats;

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Cancellation flag for one pending deferred recovery attempt
#[derive(Debug)]
struct RecoveryHandle {
    cancelled: Arc<AtomicBool>,
}

impl RecoveryHandle {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Serialized per-channel mutable state
#[derive(Debug, Default)]
struct ChannelSlot {
    server: Option<ServerConfig>,
    pending: Option<RecoveryHandle>,
}

struct EngineInner {
    config: ResilienceConfig,
    backoff: BackoffScheduler,
    quality: QualityMonitor,
    contexts: ErrorContextStore,
    failover: FailoverController,
    sink: Arc<dyn EventSink>,
    sleeper: Arc<dyn Sleeper>,
    deterministic: AtomicBool,
    shut_down: AtomicBool,
    slots: DashMap<ChannelId, Arc<Mutex<ChannelSlot>>>,
}

/// Connection resilience engine facade
#[derive(Clone)]
pub struct ResilienceEngine {
    inner: Arc<EngineInner>,
}

impl ResilienceEngine {
    /// Create an engine with the system clock and real timers
    pub fn new(config: ResilienceConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        Self::with_parts(config, sink, Arc::new(SystemClock), Arc::new(TokioSleeper))
    }

    /// Create an engine with injected clock and sleeper
    pub fn with_parts(
        config: ResilienceConfig,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self> {
        config.validate()?;

        let backoff_config = BackoffConfig::builder()
            .base_interval(config.base_retry_interval)
            .max_interval(config.max_retry_interval)
            .multiplier(config.backoff_multiplier)
            .max_attempts(config.max_retry_attempts)
            .jitter(config.jitter_enabled)
            .build()
            .map_err(|err| EngineError::Config(err.to_string()))?;
        let backoff = BackoffScheduler::new(backoff_config)
            .map_err(|err| EngineError::Config(err.to_string()))?;

        let quality =
            QualityMonitor::new(config.quality_threshold, config.latency_threshold, clock);
        let failover =
            FailoverController::new(config.failover_modes.clone(), config.failover_delay);

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                backoff,
                quality,
                contexts: ErrorContextStore::new(),
                failover,
                sink,
                sleeper,
                deterministic: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                slots: DashMap::new(),
            }),
        })
    }

    /// Report a transport-level connection failure
    ///
    /// `server`, when supplied, is cached on the channel and is what makes
    /// failover possible later in the episode.
    #[instrument(skip(self, server), level = "debug")]
    pub async fn report_connection_failure(
        &self,
        channel: &ChannelId,
        detail: &str,
        server: Option<ServerConfig>,
    ) -> Result<()> {
        let inner = &self.inner;
        if inner.is_shut_down() {
            warn!(channel = %channel, "ignoring connection failure report after shutdown");
            return Ok(());
        }

        let slot = inner.slot(channel);
        let mut guard = slot.lock().await;
        if let Some(server) = server {
            guard.server = Some(server);
        }

        inner.quality.record_failure(channel);
        let ctx = inner.contexts.note_failure(
            channel,
            ErrorCategory::Connection,
            ErrorSeverity::High,
            [("detail".to_owned(), detail.to_owned())],
        );
        let kind_count = inner.contexts.bump_kind(channel, FailureKind::Connection);

        if inner.config.alerts_enabled
            && kind_count >= inner.config.alert_thresholds.connection_failures
            && inner.contexts.mark_alerted(channel, FailureKind::Connection)
        {
            inner.contexts.push_action(channel, RecoveryAction::AlertRaised);
            if let Some(ctx) = inner.contexts.get(channel) {
                inner
                    .sink
                    .emit(EngineEvent::CriticalAlert {
                        channel: channel.clone(),
                        reason: "repeated connection failures".to_owned(),
                        context: ctx,
                    })
                    .await?;
            }
        }

        if ctx.retry_count < inner.config.max_retry_attempts {
            self.schedule_recovery(&mut guard, channel).await;
            Ok(())
        } else {
            self.escalate(&mut guard, channel).await
        }
    }

    /// Report an authentication failure with its caller-supplied reason
    #[instrument(skip(self), level = "debug")]
    pub async fn report_authentication_failure(
        &self,
        channel: &ChannelId,
        detail: &str,
        reason: &str,
    ) -> Result<()> {
        let inner = &self.inner;
        if inner.is_shut_down() {
            warn!(channel = %channel, "ignoring authentication failure report after shutdown");
            return Ok(());
        }

        let slot = inner.slot(channel);
        let mut guard = slot.lock().await;

        let ctx = inner.contexts.note_failure(
            channel,
            ErrorCategory::Authentication,
            ErrorSeverity::High,
            [
                ("detail".to_owned(), detail.to_owned()),
                ("reason".to_owned(), reason.to_owned()),
            ],
        );

        match AuthFailureReason::parse(reason) {
            AuthFailureReason::TokenExpired => {
                info!(channel = %channel, "token expired, requesting refresh");
                inner.contexts.push_action(channel, RecoveryAction::TokenRefreshRequested);
                inner
                    .sink
                    .emit(EngineEvent::TokenRefreshRequired { channel: channel.clone() })
                    .await
            }
            AuthFailureReason::InvalidToken | AuthFailureReason::TokenRevoked => {
                warn!(channel = %channel, reason, "authentication requires manual intervention");
                inner.contexts.set_actions(
                    channel,
                    vec![RecoveryAction::AlertRaised, RecoveryAction::Escalated],
                );
                let context = inner.contexts.get(channel).unwrap_or(ctx);
                inner
                    .sink
                    .emit(EngineEvent::AuthenticationCritical {
                        channel: channel.clone(),
                        context,
                    })
                    .await
            }
            AuthFailureReason::IpNotWhitelisted => {
                info!(channel = %channel, "caller address not allowlisted");
                inner
                    .contexts
                    .push_action(channel, RecoveryAction::WhitelistUpdateRequested);
                inner
                    .sink
                    .emit(EngineEvent::IpWhitelistUpdateRequired { channel: channel.clone() })
                    .await
            }
            AuthFailureReason::Other(_) => {
                let kind_count = inner.contexts.bump_kind(channel, FailureKind::AuthUnclassified);
                if inner.config.alerts_enabled
                    && kind_count >= inner.config.alert_thresholds.auth_failures
                    && inner.contexts.mark_alerted(channel, FailureKind::AuthUnclassified)
                {
                    inner.contexts.push_action(channel, RecoveryAction::AlertRaised);
                    inner
                        .sink
                        .emit(EngineEvent::AuthAlert {
                            channel: channel.clone(),
                            count: kind_count,
                        })
                        .await?;
                }
                // Unclassified reasons keep the normal retry path.
                if ctx.retry_count < inner.config.max_retry_attempts {
                    self.schedule_recovery(&mut guard, channel).await;
                    Ok(())
                } else {
                    self.escalate(&mut guard, channel).await
                }
            }
        }
    }

    /// Report a protocol error with its caller-supplied severity tag
    #[instrument(skip(self), level = "debug")]
    pub async fn report_protocol_error(
        &self,
        channel: &ChannelId,
        detail: &str,
        severity_tag: &str,
    ) -> Result<()> {
        let inner = &self.inner;
        if inner.is_shut_down() {
            warn!(channel = %channel, "ignoring protocol error report after shutdown");
            return Ok(());
        }

        let severity = ProtocolSeverity::parse(severity_tag).unwrap_or_else(|| {
            warn!(channel = %channel, tag = severity_tag, "unknown protocol severity tag");
            ProtocolSeverity::Minor
        });

        let slot = inner.slot(channel);
        let mut guard = slot.lock().await;

        let ctx = inner.contexts.note_failure(
            channel,
            ErrorCategory::Protocol,
            severity.as_error_severity(),
            [
                ("detail".to_owned(), detail.to_owned()),
                ("protocol_severity".to_owned(), severity.to_string()),
            ],
        );

        match severity {
            ProtocolSeverity::Critical => {
                if ctx.retry_count < inner.config.max_retry_attempts {
                    self.schedule_recovery(&mut guard, channel).await;
                    Ok(())
                } else {
                    self.escalate(&mut guard, channel).await
                }
            }
            ProtocolSeverity::Major => {
                // Major violations are tolerated until they accumulate.
                if ctx.occurrences() >= 3 {
                    if ctx.retry_count < inner.config.max_retry_attempts {
                        self.schedule_recovery(&mut guard, channel).await;
                        Ok(())
                    } else {
                        self.escalate(&mut guard, channel).await
                    }
                } else {
                    debug!(channel = %channel, occurrences = ctx.occurrences(), "major protocol error tolerated");
                    Ok(())
                }
            }
            ProtocolSeverity::Minor => {
                let kind_count = inner.contexts.bump_kind(channel, FailureKind::ProtocolMinor);
                if inner.config.alerts_enabled
                    && kind_count >= inner.config.alert_thresholds.protocol_errors
                    && inner.contexts.mark_alerted(channel, FailureKind::ProtocolMinor)
                {
                    inner.contexts.push_action(channel, RecoveryAction::AlertRaised);
                    inner
                        .sink
                        .emit(EngineEvent::ProtocolAlert {
                            channel: channel.clone(),
                            count: kind_count,
                        })
                        .await?;
                }
                Ok(())
            }
        }
    }

    /// Report a successful operation, closing any open episode
    #[instrument(skip(self), level = "debug")]
    pub async fn report_success(&self, channel: &ChannelId, latency_ms: f64) {
        let inner = &self.inner;
        if inner.is_shut_down() {
            warn!(channel = %channel, "ignoring success report after shutdown");
            return;
        }

        let slot = inner.slot(channel);
        let mut guard = slot.lock().await;

        if let Some(pending) = guard.pending.take() {
            pending.cancel();
            debug!(channel = %channel, "success cancelled pending recovery");
        }

        inner.quality.record_success(channel, latency_ms);
        inner.backoff.reset(channel.as_str());
        if inner.contexts.clear(channel).is_some() {
            info!(channel = %channel, "channel recovered");
        }
    }

    /// Switch between real timers and immediate synchronous recovery
    pub fn set_deterministic_mode(&self, enabled: bool) {
        self.inner.deterministic.store(enabled, Ordering::SeqCst);
        debug!(enabled, "deterministic mode changed");
    }

    /// Manually close the channel's episode and cancel pending recovery
    pub async fn clear_context(&self, channel: &ChannelId) -> Option<ErrorContext> {
        let inner = &self.inner;
        let slot = inner.slot(channel);
        let mut guard = slot.lock().await;

        if let Some(pending) = guard.pending.take() {
            pending.cancel();
        }
        inner.backoff.reset(channel.as_str());
        inner.contexts.clear(channel)
    }

    /// Tear the engine down, cancelling all pending recovery
    ///
    /// Idempotent; reports arriving after shutdown are ignored with a
    /// warning.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let slots: Vec<Arc<Mutex<ChannelSlot>>> =
            inner.slots.iter().map(|entry| Arc::clone(entry.value())).collect();
        for slot in slots {
            let mut guard = slot.lock().await;
            if let Some(pending) = guard.pending.take() {
                pending.cancel();
            }
        }

        inner.slots.clear();
        inner.contexts.clear_all();
        inner.backoff.clear_all();
        inner.quality.clear_all();
        info!("resilience engine shut down");
    }

    /// Current quality snapshot for `channel`
    pub fn quality(&self, channel: &ChannelId) -> ConnectionQuality {
        self.inner.quality.quality(channel)
    }

    /// Quality snapshots for every channel with recorded history
    pub fn quality_report(&self) -> Vec<(ChannelId, ConnectionQuality)> {
        self.inner.quality.report()
    }

    /// Aggregate error statistics over all open episodes
    pub fn error_stats(&self) -> ErrorStats {
        stats::aggregate(&self.inner.contexts.snapshot())
    }

    /// Recovery attempts recorded for `channel` in the current episode
    pub fn cached_retry_count(&self, channel: &ChannelId) -> u32 {
        self.inner.backoff.attempt_count(channel.as_str())
    }

    /// Channels currently holding an open episode
    pub fn active_channels(&self) -> Vec<ChannelId> {
        self.inner.contexts.active_channels()
    }

    /// Open episode for `channel`, if any
    pub fn context(&self, channel: &ChannelId) -> Option<ErrorContext> {
        self.inner.contexts.get(channel)
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &ResilienceConfig {
        &self.inner.config
    }
}

impl EngineInner {
    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn slot(&self, channel: &ChannelId) -> Arc<Mutex<ChannelSlot>> {
        Arc::clone(&self.slots.entry(channel.clone()).or_default())
    }

    fn active_sleeper(&self) -> Arc<dyn Sleeper> {
        if self.deterministic.load(Ordering::SeqCst) {
            Arc::new(NoopSleeper)
        } else {
            Arc::clone(&self.sleeper)
        }
    }
}

impl ResilienceEngine {
    /// Schedule the next recovery attempt for `channel`
    ///
    /// In deterministic mode the attempt runs inline while the slot is
    /// still held. Otherwise a task is spawned that waits out the backoff
    /// delay and re-validates the episode before acting.
    async fn schedule_recovery(&self, slot: &mut ChannelSlot, channel: &ChannelId) {
        let inner = &self.inner;
        inner.contexts.push_action(channel, RecoveryAction::RetryScheduled);

        if inner.deterministic.load(Ordering::SeqCst) {
            if let Err(err) = self.perform_attempt(slot, channel).await {
                error!(channel = %channel, %err, "recovery attempt failed to dispatch");
                self.spawn_system_failure(channel.clone(), err.to_string());
            }
            return;
        }

        if let Some(previous) = slot.pending.take() {
            previous.cancel();
        }
        let cancelled = Arc::new(AtomicBool::new(false));
        slot.pending = Some(RecoveryHandle { cancelled: Arc::clone(&cancelled) });

        let delay = inner.backoff.delay(channel.as_str());
        debug!(channel = %channel, delay_ms = delay.as_millis() as u64, "recovery scheduled");

        let engine = self.clone();
        let channel = channel.clone();
        tokio::spawn(async move {
            engine.inner.active_sleeper().sleep(delay).await;

            let slot = engine.inner.slot(&channel);
            let mut guard = slot.lock().await;
            if cancelled.load(Ordering::SeqCst) {
                debug!(channel = %channel, "deferred recovery cancelled before firing");
                return;
            }
            guard.pending = None;
            if engine.inner.is_shut_down() || !engine.inner.contexts.contains(&channel) {
                debug!(channel = %channel, "deferred recovery found no open episode");
                return;
            }

            if let Err(err) = engine.perform_attempt(&mut guard, &channel).await {
                error!(channel = %channel, %err, "recovery attempt failed to dispatch");
                engine.spawn_system_failure(channel.clone(), err.to_string());
            }
        });
    }

    /// Execute one recovery attempt against the live quality state
    async fn perform_attempt(&self, slot: &mut ChannelSlot, channel: &ChannelId) -> Result<()> {
        let inner = &self.inner;
        inner.backoff.record_attempt(channel.as_str());
        let attempt = inner.backoff.attempt_count(channel.as_str());
        inner.contexts.set_last_retry(channel);

        info!(channel = %channel, attempt, "recovery attempt");
        inner
            .sink
            .emit(EngineEvent::RecoveryAttempt { channel: channel.clone(), attempt })
            .await?;

        // Quality is re-checked at fire time, not at scheduling time.
        if !inner.quality.is_acceptable(channel)
            && inner.config.failover_enabled
            && slot.server.is_some()
        {
            return self.run_failover(slot, channel).await;
        }

        inner.sink.emit(EngineEvent::RetryConnection { channel: channel.clone() }).await
    }

    /// Delegate to the failover controller and record the outcome
    async fn run_failover(&self, slot: &mut ChannelSlot, channel: &ChannelId) -> Result<()> {
        let inner = &self.inner;
        let Some(server) = slot.server.as_mut() else {
            return Ok(());
        };

        inner.contexts.push_action(channel, RecoveryAction::FailoverStarted);
        let sleeper = inner.active_sleeper();
        let proposed = inner
            .failover
            .run(channel, &server.mode, inner.sink.as_ref(), sleeper.as_ref())
            .await?;

        if let Some(mode) = proposed {
            inner.contexts.insert_metadata(channel, "failover_mode", &mode.to_string());
            server.mode = mode;
        }
        Ok(())
    }

    /// Give up on automatic recovery for the episode
    async fn escalate(&self, slot: &mut ChannelSlot, channel: &ChannelId) -> Result<()> {
        let inner = &self.inner;
        inner.contexts.push_action(channel, RecoveryAction::Escalated);

        if inner.config.failover_enabled && slot.server.is_some() {
            return self.run_failover(slot, channel).await;
        }

        warn!(channel = %channel, "recovery exhausted, surfacing to operators");
        if let Some(ctx) = inner.contexts.get(channel) {
            inner
                .sink
                .emit(EngineEvent::ConnectionFailed {
                    channel: channel.clone(),
                    context: ctx,
                })
                .await?;
        }

        if inner.config.alerts_enabled {
            inner.contexts.push_action(channel, RecoveryAction::AlertRaised);
            if let Some(ctx) = inner.contexts.get(channel) {
                inner
                    .sink
                    .emit(EngineEvent::CriticalAlert {
                        channel: channel.clone(),
                        reason: "maximum retry attempts exceeded".to_owned(),
                        context: ctx,
                    })
                    .await?;
            }
        }
        Ok(())
    }

    /// Re-enter classification when dispatching a recovery attempt errors
    ///
    /// Runs on a fresh task so the failing attempt's call stack unwinds
    /// first; bounded by the retry ceiling like any other failure.
    fn spawn_system_failure(&self, channel: ChannelId, detail: String) {
        tokio::spawn(self.clone().system_failure(channel, detail));
    }

    fn system_failure(self, channel: ChannelId, detail: String) -> BoxedTask {
        Box::pin(async move {
            if self.inner.is_shut_down() {
                return;
            }

            let slot = self.inner.slot(&channel);
            let mut guard = slot.lock().await;
            let ctx = self.inner.contexts.note_failure(
                &channel,
                ErrorCategory::System,
                ErrorSeverity::High,
                [("detail".to_owned(), detail)],
            );

            if ctx.retry_count < self.inner.config.max_retry_attempts {
                self.schedule_recovery(&mut guard, &channel).await;
            } else if let Err(err) = self.escalate(&mut guard, &channel).await {
                error!(channel = %channel, %err, "escalation could not be delivered");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use guildwire_common::MockClock;

    use super::*;
    use crate::ports::RecordingSink;

    fn deterministic_engine(config: ResilienceConfig) -> (ResilienceEngine, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let engine = ResilienceEngine::with_parts(
            config,
            Arc::clone(&sink) as Arc<dyn EventSink>,
            Arc::new(MockClock::new()),
            Arc::new(NoopSleeper),
        )
        .expect("config is valid");
        engine.set_deterministic_mode(true);
        (engine, sink)
    }

    fn no_jitter_config() -> ResilienceConfig {
        ResilienceConfig::builder()
            .jitter(false)
            .failover_enabled(false)
            .build()
            .expect("config is valid")
    }

    /// Tests construction rejects an invalid configuration.
    #[test]
    fn test_invalid_config_rejected() {
        let sink: Arc<dyn EventSink> = Arc::new(RecordingSink::new());
        let config = ResilienceConfig { max_retry_attempts: 0, ..Default::default() };

        assert!(matches!(
            ResilienceEngine::new(config, sink),
            Err(EngineError::Config(_))
        ));
    }

    /// Tests a deterministic connection failure produces the attempt and
    /// retry decisions synchronously.
    #[tokio::test]
    async fn test_deterministic_failure_emits_synchronously() {
        let (engine, sink) = deterministic_engine(no_jitter_config());
        let channel = ChannelId::from("server-a");

        engine
            .report_connection_failure(&channel, "connection refused", None)
            .await
            .expect("report should succeed");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            EngineEvent::RecoveryAttempt { attempt: 1, .. }
        ));
        assert!(matches!(&events[1], EngineEvent::RetryConnection { .. }));
        assert_eq!(engine.cached_retry_count(&channel), 1);
    }

    /// Tests success deletes the episode and resets the backoff state.
    #[tokio::test]
    async fn test_success_returns_channel_to_healthy() {
        let (engine, _sink) = deterministic_engine(no_jitter_config());
        let channel = ChannelId::from("server-a");

        engine
            .report_connection_failure(&channel, "timeout", None)
            .await
            .expect("report should succeed");
        assert_eq!(engine.error_stats().active_contexts, 1);

        engine.report_success(&channel, 50.0).await;

        assert_eq!(engine.error_stats().active_contexts, 0);
        assert_eq!(engine.cached_retry_count(&channel), 0);
        assert!(engine.context(&channel).is_none());
    }

    /// Tests the context carries the actions taken and merged metadata.
    #[tokio::test]
    async fn test_context_enrichment() {
        let (engine, _sink) = deterministic_engine(no_jitter_config());
        let channel = ChannelId::from("server-a");

        engine
            .report_connection_failure(&channel, "connection reset", None)
            .await
            .expect("report should succeed");

        let ctx = engine.context(&channel).expect("episode open");
        assert_eq!(ctx.category, ErrorCategory::Connection);
        assert_eq!(ctx.severity, ErrorSeverity::High);
        assert!(ctx.recovery_actions.contains(&RecoveryAction::RetryScheduled));
        assert!(ctx.last_retry_at.is_some());
        assert_eq!(ctx.metadata.get("detail").map(String::as_str), Some("connection reset"));
    }

    /// Tests manual clearing behaves like a success for episode state.
    #[tokio::test]
    async fn test_clear_context() {
        let (engine, _sink) = deterministic_engine(no_jitter_config());
        let channel = ChannelId::from("server-a");

        engine
            .report_connection_failure(&channel, "timeout", None)
            .await
            .expect("report should succeed");

        let cleared = engine.clear_context(&channel).await;
        assert!(cleared.is_some());
        assert!(engine.context(&channel).is_none());
        assert_eq!(engine.cached_retry_count(&channel), 0);
        assert!(engine.clear_context(&channel).await.is_none());
    }

    /// Tests reports after shutdown are ignored and shutdown is idempotent.
    #[tokio::test]
    async fn test_shutdown_ignores_later_reports() {
        let (engine, sink) = deterministic_engine(no_jitter_config());
        let channel = ChannelId::from("server-a");

        engine
            .report_connection_failure(&channel, "timeout", None)
            .await
            .expect("report should succeed");
        engine.shutdown().await;
        engine.shutdown().await;
        sink.clear();

        engine
            .report_connection_failure(&channel, "timeout", None)
            .await
            .expect("ignored report still succeeds");
        engine.report_success(&channel, 10.0).await;

        assert!(sink.events().is_empty());
        assert_eq!(engine.error_stats().active_contexts, 0);
    }

    /// Tests a closed sink surfaces as a scheduling failure that re-enters
    /// classification as a system failure.
    #[tokio::test]
    async fn test_sink_failure_reenters_as_system_failure() {
        let sink = Arc::new(crate::ports::MpscEventSink::channel().0);
        let engine = ResilienceEngine::with_parts(
            no_jitter_config(),
            sink as Arc<dyn EventSink>,
            Arc::new(MockClock::new()),
            Arc::new(NoopSleeper),
        )
        .expect("config is valid");
        engine.set_deterministic_mode(true);
        let channel = ChannelId::from("server-a");

        // Receiver was dropped at construction, so the emission fails and
        // the failure is reclassified on a spawned task.
        engine
            .report_connection_failure(&channel, "timeout", None)
            .await
            .expect("dispatch failures are swallowed and reclassified");
        tokio::time::sleep(Duration::from_millis(50)).await;

        let ctx = engine.context(&channel).expect("episode open");
        assert_eq!(ctx.category, ErrorCategory::System);
    }
}
