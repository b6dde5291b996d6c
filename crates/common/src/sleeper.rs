//! Injectable deferred-scheduling abstraction
//!
//! Recovery scheduling suspends only at the delay boundary, so the delay
//! itself is the one thing that must be swappable: production code sleeps on
//! the tokio timer while deterministic tests return immediately.

use std::time::Duration;

use async_trait::async_trait;

/// Trait for waiting out a delay before a deferred action
#[async_trait]
pub trait Sleeper: Send + Sync + 'static {
    /// Suspend until `duration` has elapsed
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately, for deterministic tests and ops control
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSleeper;

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _duration: Duration) {}
}
