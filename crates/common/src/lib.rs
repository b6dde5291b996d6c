//! Generic resilience primitives shared across guildwire crates.
//!
//! This crate is deliberately domain-agnostic: it knows nothing about
//! channels, guilds, or game servers. It provides the three building blocks
//! the resilience engine is assembled from:
//!
//! - [`clock`]: a time abstraction (`Clock`) with a real and a mock
//!   implementation, enabling deterministic testing of time-window logic.
//! - [`backoff`]: a keyed exponential backoff scheduler with optional jitter.
//! - [`sleeper`]: an injectable deferred-scheduling abstraction (`Sleeper`)
//!   so production code uses real timers and tests substitute a synchronous
//!   stub.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod backoff;
pub mod clock;
pub mod sleeper;

pub use backoff::{BackoffConfig, BackoffConfigBuilder, BackoffError, BackoffScheduler};
pub use clock::{Clock, MockClock, SystemClock};
pub use sleeper::{NoopSleeper, Sleeper, TokioSleeper};
