//! Throughput observation
//!
//! Counters, gauges, and histograms feeding the end-of-run report.
//! Everything here is a pure observer of the read path: updates are
//! relaxed atomics, never block, and can never fail a read.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Counter metric (monotonically increasing)
pub struct Counter {
    value: AtomicU64,
    name: String,
    help: String,
}

impl Counter {
    /// Create a new counter
    pub fn new(name: &str, help: &str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Increment by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by delta
    pub fn inc_by(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Get current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Gauge metric (can go up or down)
pub struct Gauge {
    value: AtomicI64,
    name: String,
    help: String,
}

impl Gauge {
    /// Create a new gauge
    pub fn new(name: &str, help: &str) -> Self {
        Self {
            value: AtomicI64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Set value
    pub fn set(&self, val: i64) {
        self.value.store(val, Ordering::Relaxed);
    }

    /// Get current value
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} gauge\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Histogram for latency measurements
pub struct Histogram {
    buckets: Vec<(f64, AtomicU64)>,
    sum: AtomicU64,
    count: AtomicU64,
    name: String,
    help: String,
}

impl Histogram {
    /// Create with default buckets
    pub fn new(name: &str, help: &str) -> Self {
        Self::with_buckets(
            name,
            help,
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
    }

    /// Create with custom buckets
    pub fn with_buckets(name: &str, help: &str, bounds: Vec<f64>) -> Self {
        let buckets = bounds.into_iter().map(|b| (b, AtomicU64::new(0))).collect();

        Self {
            buckets,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Observe a value
    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);

        // Sum kept as micros for precision
        let micros = (value * 1_000_000.0) as u64;
        self.sum.fetch_add(micros, Ordering::Relaxed);

        for (bound, count) in &self.buckets {
            if value <= *bound {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Observations recorded so far
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Mean of observed values in seconds
    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.sum.load(Ordering::Relaxed) as f64 / 1_000_000.0 / count as f64
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        let mut output = format!(
            "# HELP {} {}\n# TYPE {} histogram\n",
            self.name, self.help, self.name
        );

        for (bound, count) in &self.buckets {
            output.push_str(&format!(
                "{}_bucket{{le=\"{}\"}} {}\n",
                self.name,
                bound,
                count.load(Ordering::Relaxed)
            ));
        }

        let sum_secs = self.sum.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        output.push_str(&format!("{}_sum {}\n", self.name, sum_secs));
        output.push_str(&format!(
            "{}_count {}\n",
            self.name,
            self.count.load(Ordering::Relaxed)
        ));

        output
    }
}

/// Step, epoch, and byte accounting for one loader
///
/// Shared read-only across the orchestrator and all of its workers.
/// Counter updates interleave without synchronization; the report is
/// approximate by design and has no effect on read correctness.
pub struct ThroughputTracker {
    samples: Counter,
    sample_bytes: Counter,
    batches: Counter,
    fetches: Counter,
    fetch_bytes: Counter,
    fetch_seconds: Histogram,
    step: Gauge,
    epoch: Gauge,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl ThroughputTracker {
    /// Create a tracker; the wall clock for rate reporting starts now
    pub fn new() -> Self {
        Self {
            samples: Counter::new("riptide_samples_read_total", "Samples read"),
            sample_bytes: Counter::new("riptide_sample_bytes_total", "Decoded sample bytes read"),
            batches: Counter::new("riptide_batches_total", "Batches delivered"),
            fetches: Counter::new("riptide_object_fetches_total", "Objects fetched from storage"),
            fetch_bytes: Counter::new("riptide_object_bytes_total", "Raw object bytes fetched"),
            fetch_seconds: Histogram::new("riptide_fetch_duration_seconds", "Object fetch latency"),
            step: Gauge::new("riptide_current_step", "Current step"),
            epoch: Gauge::new("riptide_current_epoch", "Current epoch"),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Record one consumed sample together with the step and epoch it
    /// was consumed at
    pub fn record(&self, step: u64, epoch: u64, nbytes: u64) {
        self.update_step(step, epoch);
        self.record_sample(nbytes);
    }

    /// Advance the step/epoch gauges without counting a sample
    pub fn update_step(&self, step: u64, epoch: u64) {
        self.step.set(step as i64);
        self.epoch.set(epoch as i64);
    }

    /// Record the decoded byte size of one sample
    pub fn record_sample(&self, nbytes: u64) {
        self.samples.inc();
        self.sample_bytes.inc_by(nbytes);
    }

    /// Record one object fetch from the remote store
    pub fn record_fetch(&self, seconds: f64, nbytes: u64) {
        self.fetches.inc();
        self.fetch_bytes.inc_by(nbytes);
        self.fetch_seconds.observe(seconds);
    }

    /// Record one delivered batch
    pub fn record_batch(&self) {
        self.batches.inc();
    }

    /// Samples recorded so far
    pub fn samples_read(&self) -> u64 {
        self.samples.get()
    }

    /// Decoded sample bytes recorded so far
    pub fn sample_bytes_read(&self) -> u64 {
        self.sample_bytes.get()
    }

    /// Object fetches recorded so far
    pub fn object_fetches(&self) -> u64 {
        self.fetches.get()
    }

    /// Batches recorded so far
    pub fn batches_delivered(&self) -> u64 {
        self.batches.get()
    }

    /// Step gauge value
    pub fn current_step(&self) -> i64 {
        self.step.get()
    }

    /// Epoch gauge value
    pub fn current_epoch(&self) -> i64 {
        self.epoch.get()
    }

    /// Snapshot the counters into a report
    pub fn summary(&self) -> ThroughputSummary {
        let elapsed = self.started.elapsed();
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        let samples = self.samples.get();
        let bytes = self.sample_bytes.get();
        ThroughputSummary {
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed,
            samples,
            sample_bytes: bytes,
            batches: self.batches.get(),
            fetches: self.fetches.get(),
            fetch_bytes: self.fetch_bytes.get(),
            mean_fetch_seconds: self.fetch_seconds.mean(),
            samples_per_sec: samples as f64 / secs,
            mbytes_per_sec: bytes as f64 / 1024.0 / 1024.0 / secs,
        }
    }

    /// Export all metrics in Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        output.push_str(&self.samples.to_prometheus());
        output.push_str(&self.sample_bytes.to_prometheus());
        output.push_str(&self.batches.to_prometheus());
        output.push_str(&self.fetches.to_prometheus());
        output.push_str(&self.fetch_bytes.to_prometheus());
        output.push_str(&self.fetch_seconds.to_prometheus());
        output.push_str(&self.step.to_prometheus());
        output.push_str(&self.epoch.to_prometheus());
        output
    }
}

impl Default for ThroughputTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time throughput report
#[derive(Debug, Clone)]
pub struct ThroughputSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub samples: u64,
    pub sample_bytes: u64,
    pub batches: u64,
    pub fetches: u64,
    pub fetch_bytes: u64,
    pub mean_fetch_seconds: f64,
    pub samples_per_sec: f64,
    pub mbytes_per_sec: f64,
}

impl std::fmt::Display for ThroughputSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} samples in {} batches ({} object fetches) over {:.2}s: {:.1} samples/s, {:.2} MB/s",
            self.samples,
            self.batches,
            self.fetches,
            self.elapsed.as_secs_f64(),
            self.samples_per_sec,
            self.mbytes_per_sec,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_counter", "Test counter");
        assert_eq!(counter.get(), 0);

        counter.inc();
        assert_eq!(counter.get(), 1);

        counter.inc_by(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new("test_gauge", "Test gauge");
        gauge.set(10);
        assert_eq!(gauge.get(), 10);
    }

    #[test]
    fn test_histogram_counts() {
        let histogram = Histogram::new("test_histogram", "Test histogram");

        histogram.observe(0.001);
        histogram.observe(0.01);
        histogram.observe(0.1);

        assert_eq!(histogram.count(), 3);
        let prometheus = histogram.to_prometheus();
        assert!(prometheus.contains("test_histogram_count 3"));
    }

    #[test]
    fn test_tracker_record() {
        let tracker = ThroughputTracker::new();
        tracker.record(1, 0, 100);
        tracker.record(1, 0, 100);
        tracker.record(2, 0, 100);

        assert_eq!(tracker.samples_read(), 3);
        assert_eq!(tracker.sample_bytes_read(), 300);
        assert_eq!(tracker.current_step(), 2);
        assert_eq!(tracker.current_epoch(), 0);
    }

    #[test]
    fn test_summary_rates() {
        let tracker = ThroughputTracker::new();
        tracker.record(1, 0, 1024);
        tracker.record_batch();

        let summary = tracker.summary();
        assert_eq!(summary.samples, 1);
        assert_eq!(summary.batches, 1);
        assert!(summary.samples_per_sec > 0.0);
    }
}
