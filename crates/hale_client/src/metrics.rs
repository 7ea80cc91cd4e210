//! Rolling request metrics: a strict left-to-right fold over completed requests.

use serde::{Deserialize, Serialize};

/// Aggregate over every completed (resolved or failed) request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_requests: u64,
    pub avg_response_time_ms: u64,
    /// Percentage of completed requests that resolved, two decimals.
    pub success_rate: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            avg_response_time_ms: 0,
            success_rate: 100.0,
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    current: Metrics,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation. Failed requests contribute their latency too.
    pub fn record(&mut self, success: bool, latency_ms: u64) -> Metrics {
        let old_count = self.current.total_requests as f64;
        let new_count = old_count + 1.0;

        let avg = (self.current.avg_response_time_ms as f64 * old_count + latency_ms as f64)
            / new_count;
        let hit = if success { 100.0 } else { 0.0 };
        let rate = (self.current.success_rate * old_count + hit) / new_count;

        self.current = Metrics {
            total_requests: self.current.total_requests + 1,
            avg_response_time_ms: avg.round() as u64,
            success_rate: round2(rate),
        };
        self.current
    }

    pub fn snapshot(&self) -> Metrics {
        self.current
    }

    /// Replay a sequence of `(success, latency_ms)` observations from scratch.
    pub fn replay<I>(observations: I) -> Metrics
    where
        I: IntoIterator<Item = (bool, u64)>,
    {
        let mut agg = Self::new();
        for (success, latency_ms) in observations {
            agg.record(success, latency_ms);
        }
        agg.snapshot()
    }
}
