//! Rolling statistical model of channel health
//!
//! Per channel, the monitor retains the last 100 latency samples and the
//! failure timestamps of the past hour, and recomputes a 0-100 score from
//! them on every read. A channel with no history scores a perfect 100: new
//! or never-failed channels are optimistically trusted.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use guildwire_common::Clock;
use guildwire_domain::{ChannelId, ConnectionQuality};
use tracing::debug;

/// Latency samples retained per channel, oldest evicted first
const MAX_LATENCY_SAMPLES: usize = 100;

/// Age beyond which failure timestamps are pruned
const FAILURE_WINDOW: Duration = Duration::from_secs(3600);

/// Divisor turning latency variance into the stability factor
const VARIANCE_SCALE: f64 = 1000.0;

/// Largest score deduction attributable to latency alone
const MAX_LATENCY_PENALTY: f64 = 50.0;

/// Milliseconds of excess latency per deducted score point
const LATENCY_PENALTY_DIVISOR: f64 = 10.0;

#[derive(Debug, Default)]
struct ChannelWindow {
    latencies: VecDeque<f64>,
    failures: VecDeque<(Instant, DateTime<Utc>)>,
}

impl ChannelWindow {
    fn prune(&mut self, now: Instant) {
        while let Some(&(at, _)) = self.failures.front() {
            if now.duration_since(at) > FAILURE_WINDOW {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        while self.latencies.len() > MAX_LATENCY_SAMPLES {
            self.latencies.pop_front();
        }
    }
}

/// Rolling per-channel health monitor
pub struct QualityMonitor {
    quality_threshold: u8,
    latency_threshold: f64,
    clock: Arc<dyn Clock>,
    windows: DashMap<ChannelId, ChannelWindow>,
}

impl QualityMonitor {
    /// Create a monitor with the given acceptability and latency thresholds
    pub fn new(quality_threshold: u8, latency_threshold: f64, clock: Arc<dyn Clock>) -> Self {
        Self { quality_threshold, latency_threshold, clock, windows: DashMap::new() }
    }

    /// Record a successful operation and its observed latency
    ///
    /// A success also discards the channel's accumulated failure
    /// timestamps: the channel is demonstrably healthy again and earlier
    /// failures must not keep dragging its score down.
    pub fn record_success(&self, channel: &ChannelId, latency_ms: f64) {
        let now = self.clock.now();
        let mut window = self.windows.entry(channel.clone()).or_default();
        window.latencies.push_back(latency_ms);
        window.failures.clear();
        window.prune(now);
    }

    /// Record a failed operation
    pub fn record_failure(&self, channel: &ChannelId) {
        let now = self.clock.now();
        let wall = DateTime::<Utc>::from(self.clock.system_time());
        let mut window = self.windows.entry(channel.clone()).or_default();
        window.failures.push_back((now, wall));
        window.prune(now);
        debug!(channel = %channel, failures = window.failures.len(), "failure recorded");
    }

    /// Recompute the quality snapshot for `channel`
    pub fn quality(&self, channel: &ChannelId) -> ConnectionQuality {
        let now = self.clock.now();
        let Some(mut window) = self.windows.get_mut(channel) else {
            return ConnectionQuality::perfect();
        };
        window.prune(now);

        let success_count = window.latencies.len();
        let failure_count = window.failures.len();
        if success_count == 0 && failure_count == 0 {
            return ConnectionQuality::perfect();
        }

        let average_latency = if success_count == 0 {
            0.0
        } else {
            window.latencies.iter().sum::<f64>() / success_count as f64
        };

        let success_rate = success_count as f64 / (success_count + failure_count) as f64;

        let stability = if success_count < 2 {
            1.0
        } else {
            let variance = window
                .latencies
                .iter()
                .map(|l| (l - average_latency).powi(2))
                .sum::<f64>()
                / success_count as f64;
            (1.0 - variance / VARIANCE_SCALE).max(0.0)
        };

        let mut score = 100.0;
        score -= ((average_latency - self.latency_threshold).max(0.0) / LATENCY_PENALTY_DIVISOR)
            .min(MAX_LATENCY_PENALTY);
        score *= success_rate;
        score *= stability;

        ConnectionQuality {
            score: score.floor().max(0.0) as u8,
            average_latency,
            success_rate,
            failure_count,
            last_failure: window.failures.back().map(|&(_, wall)| wall),
            stability,
        }
    }

    /// Whether the channel's score meets the configured threshold
    pub fn is_acceptable(&self, channel: &ChannelId) -> bool {
        self.quality(channel).score >= self.quality_threshold
    }

    /// Quality snapshots for every channel with recorded history
    pub fn report(&self) -> Vec<(ChannelId, ConnectionQuality)> {
        let channels: Vec<ChannelId> =
            self.windows.iter().map(|entry| entry.key().clone()).collect();
        channels.into_iter().map(|ch| (ch.clone(), self.quality(&ch))).collect()
    }

    /// Drop all recorded history
    pub fn clear_all(&self) {
        self.windows.clear();
    }
}
