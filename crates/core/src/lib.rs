//! # Guildwire Core
//!
//! The connection resilience engine: classifies failures reported by the
//! transport layer, schedules retries with exponential backoff, scores
//! channel health from rolling latency and failure windows, and decides when
//! a channel must fail over to an alternate transport mode.
//!
//! The engine never touches the network. Callers report outcomes through
//! [`engine::ResilienceEngine`] and consume the decisions it emits through
//! an [`ports::EventSink`].

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod context;
pub mod engine;
pub mod events;
pub mod failover;
pub mod ports;
pub mod quality;
pub mod stats;

pub use context::{ErrorContextStore, FailureKind};
pub use engine::ResilienceEngine;
pub use events::EngineEvent;
pub use failover::FailoverController;
pub use ports::{EventSink, MpscEventSink, RecordingSink};
pub use quality::QualityMonitor;
