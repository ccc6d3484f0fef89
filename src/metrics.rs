//! Latency histograms for the wake and recording paths.
//! Each metric keeps a bounded window of recent samples; summaries report
//! p50/p95/p99 and the worst case in microseconds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Most recent `capacity` latencies for one metric, in microseconds.
struct LatencyWindow {
    samples: Box<[u64]>,
    next: usize,
    filled: usize,
}

impl LatencyWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0; capacity].into_boxed_slice(),
            next: 0,
            filled: 0,
        }
    }

    fn push(&mut self, value_us: u64) {
        self.samples[self.next] = value_us;
        self.next = (self.next + 1) % self.samples.len();
        self.filled = (self.filled + 1).min(self.samples.len());
    }

    fn summarize(&self) -> MetricSummary {
        let mut sorted = self.samples[..self.filled].to_vec();
        sorted.sort_unstable();
        let at = |p: f64| -> u64 {
            if sorted.is_empty() {
                return 0;
            }
            let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
            sorted[idx.min(sorted.len() - 1)]
        };
        MetricSummary {
            count: self.filled,
            p50_us: at(50.0),
            p95_us: at(95.0),
            p99_us: at(99.0),
            max_us: sorted.last().copied().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricSummary {
    pub count: usize,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

pub struct MetricsRegistry {
    windows: Mutex<BTreeMap<&'static str, LatencyWindow>>,
    window_len: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Keep at most `window_len` recent samples per metric.
    pub fn with_capacity(window_len: usize) -> Self {
        Self {
            windows: Mutex::new(BTreeMap::new()),
            window_len: window_len.max(1),
        }
    }

    pub fn record(&self, name: &'static str, elapsed: Duration) {
        let value_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.windows
            .lock()
            .entry(name)
            .or_insert_with(|| LatencyWindow::new(self.window_len))
            .push(value_us);
        tracing::trace!(metric = name, value_us, "metric_recorded");
    }

    /// Time from now until `TimingSpan::finish`.
    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    /// Per-metric summary, ordered by metric name.
    pub fn summary(&self) -> BTreeMap<&'static str, MetricSummary> {
        self.windows
            .lock()
            .iter()
            .map(|(&name, window)| (name, window.summarize()))
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Started by `MetricsRegistry::span`; records into the registry on `finish`.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        self.registry.record(self.name, elapsed);
        elapsed
    }
}

pub mod metric_names {
    /// Features, history and matcher for one frame.
    pub const FRAME_PROCESS: &str = "t_frame_process";
    /// Callback plus event-queue delivery after an accepted detection.
    pub const WAKE_CALLBACK: &str = "t_wake_callback";
    /// Listener stop and microphone release after a detection.
    pub const HANDOFF: &str = "t_mic_handoff";
    pub const RECORDING: &str = "t_recording";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reports_percentiles_and_max() {
        let m = MetricsRegistry::new();
        for us in 1..=100 {
            m.record(metric_names::FRAME_PROCESS, Duration::from_micros(us));
        }
        let s = &m.summary()[metric_names::FRAME_PROCESS];
        assert_eq!(s.count, 100);
        assert!(s.p50_us.abs_diff(50) <= 1);
        assert!(s.p99_us >= 98);
        assert_eq!(s.max_us, 100);
    }

    #[test]
    fn window_keeps_only_recent_samples() {
        let m = MetricsRegistry::with_capacity(4);
        for us in [1000, 1000, 1, 2, 3, 4] {
            m.record(metric_names::WAKE_CALLBACK, Duration::from_micros(us));
        }
        let s = &m.summary()[metric_names::WAKE_CALLBACK];
        assert_eq!(s.count, 4);
        assert_eq!(s.max_us, 4);
    }

    #[test]
    fn span_records_on_finish() {
        let m = Arc::new(MetricsRegistry::new());
        m.span(metric_names::RECORDING).finish();
        assert_eq!(m.summary()[metric_names::RECORDING].count, 1);
        assert!(!m.summary().contains_key(metric_names::HANDOFF));
    }
}
