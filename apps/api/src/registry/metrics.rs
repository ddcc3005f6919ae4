//! Render instrumentation: latency distribution and error count.
//!
//! Side-channel only. The counters are process-wide atomics updated on
//! every render attempt; nothing on the render path reads them, so their
//! absence can never affect output or hashes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Upper bounds (seconds) of the latency histogram buckets. A final
/// overflow bucket catches everything slower.
const LATENCY_BUCKETS_SECS: [f64; 9] = [0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

#[derive(Default)]
pub struct RenderMetrics {
    render_count: AtomicU64,
    error_count: AtomicU64,
    latency_micros_sum: AtomicU64,
    buckets: [AtomicU64; LATENCY_BUCKETS_SECS.len() + 1],
}

/// Point-in-time snapshot, serialized by the metrics endpoint.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub render_count: u64,
    pub error_count: u64,
    pub latency_micros_sum: u64,
    pub latency_bucket_bounds_secs: Vec<f64>,
    pub latency_bucket_counts: Vec<u64>,
}

impl RenderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one render attempt's latency.
    pub fn observe_render(&self, elapsed: Duration) {
        self.render_count.fetch_add(1, Ordering::Relaxed);
        self.latency_micros_sum
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        let secs = elapsed.as_secs_f64();
        let idx = LATENCY_BUCKETS_SECS
            .iter()
            .position(|&bound| secs <= bound)
            .unwrap_or(LATENCY_BUCKETS_SECS.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Records one failed render attempt.
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            render_count: self.render_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            latency_micros_sum: self.latency_micros_sum.load(Ordering::Relaxed),
            latency_bucket_bounds_secs: LATENCY_BUCKETS_SECS.to_vec(),
            latency_bucket_counts: self
                .buckets
                .iter()
                .map(|b| b.load(Ordering::Relaxed))
                .collect(),
        }
    }
}
