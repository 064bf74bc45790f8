//! Rolling Performance Window
//!
//! A bounded ring of `(timestamp, response_ms, success)` samples plus an
//! incrementally-maintained long-run average. When the long-run weight
//! passes 1000 samples the history weight is halved, so old behavior fades
//! instead of anchoring the average forever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default ring capacity.
pub const DEFAULT_WINDOW_SIZE: usize = 50;

/// Sample count at which the running average decays (history weight halves).
const DECAY_AT_WEIGHT: f64 = 1000.0;

/// One performance sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfSample {
    /// When the sample was recorded
    pub at: DateTime<Utc>,
    /// Observed response time
    pub response_ms: f64,
    /// Whether the operation succeeded
    pub success: bool,
}

/// Trend of recent samples against the older half of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    /// Recent average at least 30% better
    Improving,
    /// Within the ±30% band
    Stable,
    /// Recent average at least 30% worse
    Degrading,
}

/// Bounded performance window with derived statistics.
#[derive(Debug)]
pub struct PerformanceWindow {
    ring: VecDeque<PerfSample>,
    capacity: usize,
    total_samples: u64,
    running_avg_ms: f64,
    running_weight: f64,
    consecutive_failures: u32,
}

impl Default for PerformanceWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl PerformanceWindow {
    /// Window with the given ring capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            total_samples: 0,
            running_avg_ms: 0.0,
            running_weight: 0.0,
            consecutive_failures: 0,
        }
    }

    /// Record one sample.
    pub fn record(&mut self, response_ms: f64, success: bool) {
        let response_ms = response_ms.max(0.0);
        self.ring.push_back(PerfSample {
            at: Utc::now(),
            response_ms,
            success,
        });
        while self.ring.len() > self.capacity {
            self.ring.pop_front();
        }

        self.total_samples += 1;
        self.running_avg_ms = (self.running_avg_ms * self.running_weight + response_ms)
            / (self.running_weight + 1.0);
        self.running_weight += 1.0;
        if self.running_weight > DECAY_AT_WEIGHT {
            // Halve the weight of history; the average itself is unchanged.
            self.running_weight /= 2.0;
        }

        if success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
    }

    /// Samples currently in the ring.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Samples ever recorded.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Long-run decayed average response time.
    pub fn running_average_ms(&self) -> f64 {
        self.running_avg_ms
    }

    /// Mean response time over the ring.
    pub fn recent_average_ms(&self) -> f64 {
        if self.ring.is_empty() {
            return 0.0;
        }
        self.ring.iter().map(|s| s.response_ms).sum::<f64>() / self.ring.len() as f64
    }

    /// Mean over the most recent `n` samples.
    pub fn recent_n_average_ms(&self, n: usize) -> f64 {
        let take = n.min(self.ring.len());
        if take == 0 {
            return 0.0;
        }
        self.ring
            .iter()
            .rev()
            .take(take)
            .map(|s| s.response_ms)
            .sum::<f64>()
            / take as f64
    }

    /// Failure rate over the most recent `n` samples.
    pub fn recent_n_error_rate(&self, n: usize) -> f64 {
        let take = n.min(self.ring.len());
        if take == 0 {
            return 0.0;
        }
        let failures = self
            .ring
            .iter()
            .rev()
            .take(take)
            .filter(|s| !s.success)
            .count();
        failures as f64 / take as f64
    }

    /// Success rate over the ring.
    pub fn recent_success_rate(&self) -> f64 {
        if self.ring.is_empty() {
            return 1.0;
        }
        let successes = self.ring.iter().filter(|s| s.success).count();
        successes as f64 / self.ring.len() as f64
    }

    /// Failures in the ring.
    pub fn recent_error_count(&self) -> usize {
        self.ring.iter().filter(|s| !s.success).count()
    }

    /// Current run of failures.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Trend: recent half of the ring vs the older half, ±30% band.
    pub fn trend(&self) -> Trend {
        if self.ring.len() < 4 {
            return Trend::Stable;
        }
        let half = self.ring.len() / 2;
        let older: f64 =
            self.ring.iter().take(half).map(|s| s.response_ms).sum::<f64>() / half as f64;
        let recent: f64 = self
            .ring
            .iter()
            .skip(half)
            .map(|s| s.response_ms)
            .sum::<f64>()
            / (self.ring.len() - half) as f64;

        if older <= 0.0 {
            return Trend::Stable;
        }
        let ratio = recent / older;
        if ratio > 1.3 {
            Trend::Degrading
        } else if ratio < 0.7 {
            Trend::Improving
        } else {
            Trend::Stable
        }
    }

    /// Immutable view of the ring, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &PerfSample> {
        self.ring.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_is_bounded() {
        let mut window = PerformanceWindow::new(5);
        for i in 0..20 {
            window.record(i as f64, true);
        }
        assert_eq!(window.len(), 5);
        assert_eq!(window.total_samples(), 20);
    }

    #[test]
    fn test_recent_average() {
        let mut window = PerformanceWindow::new(10);
        window.record(100.0, true);
        window.record(300.0, true);
        assert!((window.recent_average_ms() - 200.0).abs() < 1e-9);
        assert!((window.recent_n_average_ms(1) - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_consecutive_failures_reset_on_success() {
        let mut window = PerformanceWindow::default();
        window.record(10.0, false);
        window.record(10.0, false);
        assert_eq!(window.consecutive_failures(), 2);
        window.record(10.0, true);
        assert_eq!(window.consecutive_failures(), 0);
    }

    #[test]
    fn test_trend_degrading() {
        let mut window = PerformanceWindow::new(10);
        for _ in 0..5 {
            window.record(100.0, true);
        }
        for _ in 0..5 {
            window.record(200.0, true);
        }
        assert_eq!(window.trend(), Trend::Degrading);
    }

    #[test]
    fn test_trend_improving() {
        let mut window = PerformanceWindow::new(10);
        for _ in 0..5 {
            window.record(200.0, true);
        }
        for _ in 0..5 {
            window.record(100.0, true);
        }
        assert_eq!(window.trend(), Trend::Improving);
    }

    #[test]
    fn test_trend_stable_with_few_samples() {
        let mut window = PerformanceWindow::default();
        window.record(1.0, true);
        window.record(1000.0, true);
        assert_eq!(window.trend(), Trend::Stable);
    }

    #[test]
    fn test_running_average_decay_halves_weight() {
        let mut window = PerformanceWindow::new(10);
        for _ in 0..1200 {
            window.record(100.0, true);
        }
        let anchored = window.running_average_ms();
        assert!((anchored - 100.0).abs() < 1e-6);

        // After decay kicks in, a shift moves the average faster than a
        // 1200-sample anchor would allow.
        for _ in 0..300 {
            window.record(500.0, true);
        }
        assert!(window.running_average_ms() > 200.0);
    }

    #[test]
    fn test_error_rates() {
        let mut window = PerformanceWindow::new(10);
        for i in 0..10 {
            window.record(10.0, i % 2 == 0);
        }
        assert!((window.recent_success_rate() - 0.5).abs() < 1e-9);
        assert_eq!(window.recent_error_count(), 5);
        assert!((window.recent_n_error_rate(2) - 0.5).abs() < 1e-9);
    }
}
