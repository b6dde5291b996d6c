//! Port interfaces between the engine and its caller
//!
//! These traits define the boundary between the engine's decision logic and
//! the transport layer that executes decisions. Only one consumer observes
//! the decision stream, so the production port is a single-consumer mpsc
//! channel rather than a broadcast registry.

use async_trait::async_trait;
use guildwire_domain::{EngineError, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::events::EngineEvent;

/// Outbound port for engine decisions
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Deliver one decision to the consumer
    async fn emit(&self, event: EngineEvent) -> Result<()>;
}

/// Production sink backed by an unbounded mpsc channel
///
/// The receiving half belongs to the transport layer. Emission fails only
/// when the receiver has been dropped, which the engine treats as a
/// scheduling failure.
#[derive(Debug, Clone)]
pub struct MpscEventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl MpscEventSink {
    /// Create a sink and the receiver the transport layer consumes
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for MpscEventSink {
    async fn emit(&self, event: EngineEvent) -> Result<()> {
        debug!(kind = event.kind(), channel = %event.channel(), "emitting decision");
        self.tx.send(event).map_err(|err| EngineError::SinkClosed(err.to_string()))
    }
}

/// Test sink that records every emitted decision in order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingSink {
    /// Create an empty recording sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, in emission order
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events matching `predicate`
    pub fn count_matching(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Discard all recorded events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: EngineEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}
