//! Campaign and vendor metrics
//!
//! Lock-free counters shared between the orchestrator, the poll loop and the
//! HTTP API, rendered in Prometheus exposition format.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Point-in-time value
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latency histogram with fixed millisecond buckets
#[derive(Debug)]
pub struct Histogram {
    /// Upper bounds in milliseconds
    bounds_ms: &'static [u64],
    counts: Vec<AtomicU64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

/// Vendor calls: 25ms up to the 10s request timeout and beyond
const VENDOR_BUCKETS_MS: &[u64] = &[25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

/// Campaign ticks include vendor calls plus store writes
const TICK_BUCKETS_MS: &[u64] = &[10, 50, 100, 500, 1_000, 5_000, 10_000, 30_000, 60_000];

impl Histogram {
    pub fn with_bounds(bounds_ms: &'static [u64]) -> Self {
        Self {
            bounds_ms,
            counts: bounds_ms.iter().map(|_| AtomicU64::new(0)).collect(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, duration: Duration) {
        let micros = duration.as_micros().min(u128::from(u64::MAX)) as u64;
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        if let Some(i) = self.bounds_ms.iter().position(|&b| micros <= b * 1_000) {
            self.counts[i].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.sum_micros.load(Ordering::Relaxed) as f64 / count as f64 / 1_000.0
    }
}

/// All process metrics
#[derive(Debug)]
pub struct Metrics {
    pub campaigns_started: Counter,
    pub campaigns_completed: Counter,
    pub campaigns_cancelled: Counter,
    pub campaigns_failed: Counter,
    pub active_campaigns: Gauge,

    pub iterations_launched: Counter,
    pub iterations_completed: Counter,
    pub iterations_failed: Counter,
    pub launch_failures: Counter,
    pub records_collected: Counter,
    pub duplicates_removed: Counter,

    pub stalls_detected: Counter,
    pub recoveries_started: Counter,
    pub attention_required: Counter,

    pub vendor_requests: Counter,
    pub vendor_errors: Counter,
    pub vendor_latency: Histogram,

    pub poll_cycles: Counter,
    pub tick_failures: Counter,
    pub tick_latency: Histogram,

    pub http_requests: Counter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            campaigns_started: Counter::default(),
            campaigns_completed: Counter::default(),
            campaigns_cancelled: Counter::default(),
            campaigns_failed: Counter::default(),
            active_campaigns: Gauge::default(),
            iterations_launched: Counter::default(),
            iterations_completed: Counter::default(),
            iterations_failed: Counter::default(),
            launch_failures: Counter::default(),
            records_collected: Counter::default(),
            duplicates_removed: Counter::default(),
            stalls_detected: Counter::default(),
            recoveries_started: Counter::default(),
            attention_required: Counter::default(),
            vendor_requests: Counter::default(),
            vendor_errors: Counter::default(),
            vendor_latency: Histogram::with_bounds(VENDOR_BUCKETS_MS),
            poll_cycles: Counter::default(),
            tick_failures: Counter::default(),
            tick_latency: Histogram::with_bounds(TICK_BUCKETS_MS),
            http_requests: Counter::default(),
        }
    }
}

impl Metrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            campaigns_started: self.campaigns_started.get(),
            campaigns_completed: self.campaigns_completed.get(),
            campaigns_cancelled: self.campaigns_cancelled.get(),
            active_campaigns: self.active_campaigns.get(),
            iterations_launched: self.iterations_launched.get(),
            iterations_completed: self.iterations_completed.get(),
            launch_failures: self.launch_failures.get(),
            stalls_detected: self.stalls_detected.get(),
            recoveries_started: self.recoveries_started.get(),
            attention_required: self.attention_required.get(),
            vendor_errors: self.vendor_errors.get(),
            vendor_latency_ms: self.vendor_latency.mean_ms(),
            poll_cycles: self.poll_cycles.get(),
            tick_failures: self.tick_failures.get(),
        }
    }

    pub fn to_prometheus(&self) -> String {
        let mut out = String::with_capacity(4096);

        let counters: [(&str, &str, &Counter); 18] = [
            ("recrawl_campaigns_started_total", "Campaigns created", &self.campaigns_started),
            ("recrawl_campaigns_completed_total", "Campaigns that reached completion", &self.campaigns_completed),
            ("recrawl_campaigns_cancelled_total", "Campaigns cancelled by an operator", &self.campaigns_cancelled),
            ("recrawl_campaigns_failed_total", "Campaigns failed on unrecoverable input", &self.campaigns_failed),
            ("recrawl_iterations_launched_total", "Vendor runs started", &self.iterations_launched),
            ("recrawl_iterations_completed_total", "Iterations completed", &self.iterations_completed),
            ("recrawl_iterations_failed_total", "Iterations failed without usable output", &self.iterations_failed),
            ("recrawl_launch_failures_total", "Vendor run launches that failed", &self.launch_failures),
            ("recrawl_records_collected_total", "Rows collected from completed iterations", &self.records_collected),
            ("recrawl_duplicates_removed_total", "Rows dropped as duplicates during consolidation", &self.duplicates_removed),
            ("recrawl_stalls_detected_total", "Runs classified as stuck, cancelled, errored or low-yield", &self.stalls_detected),
            ("recrawl_recoveries_started_total", "Automatic recoveries started", &self.recoveries_started),
            ("recrawl_attention_required_total", "Campaigns that exhausted their recovery budget", &self.attention_required),
            ("recrawl_vendor_requests_total", "Vendor API requests", &self.vendor_requests),
            ("recrawl_vendor_errors_total", "Vendor API requests that failed", &self.vendor_errors),
            ("recrawl_poll_cycles_total", "Poll loop cycles", &self.poll_cycles),
            ("recrawl_tick_failures_total", "Campaign ticks that returned an error", &self.tick_failures),
            ("recrawl_http_requests_total", "Control API requests", &self.http_requests),
        ];
        for (name, help, counter) in counters {
            write_metric(&mut out, name, help, "counter", counter.get());
        }

        write_metric(
            &mut out,
            "recrawl_active_campaigns",
            "Campaigns still being polled",
            "gauge",
            self.active_campaigns.get(),
        );
        write_histogram(&mut out, "recrawl_vendor_latency_seconds", "Vendor API latency", &self.vendor_latency);
        write_histogram(&mut out, "recrawl_tick_latency_seconds", "Campaign tick latency", &self.tick_latency);

        out
    }
}

fn write_metric(out: &mut String, name: &str, help: &str, kind: &str, value: u64) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
    let _ = writeln!(out, "{} {}", name, value);
    let _ = writeln!(out);
}

fn write_histogram(out: &mut String, name: &str, help: &str, hist: &Histogram) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} histogram", name);

    let mut cumulative = 0;
    for (bound, count) in hist.bounds_ms.iter().zip(&hist.counts) {
        cumulative += count.load(Ordering::Relaxed);
        let _ = writeln!(out, "{}_bucket{{le=\"{:.3}\"}} {}", name, *bound as f64 / 1_000.0, cumulative);
    }
    let total = hist.count();
    let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, total);
    let sum_seconds = hist.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
    let _ = writeln!(out, "{}_sum {:.6}", name, sum_seconds);
    let _ = writeln!(out, "{}_count {}", name, total);
    let _ = writeln!(out);
}

/// Point-in-time snapshot for the JSON health endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub campaigns_started: u64,
    pub campaigns_completed: u64,
    pub campaigns_cancelled: u64,
    pub active_campaigns: u64,
    pub iterations_launched: u64,
    pub iterations_completed: u64,
    pub launch_failures: u64,
    pub stalls_detected: u64,
    pub recoveries_started: u64,
    pub attention_required: u64,
    pub vendor_errors: u64,
    pub vendor_latency_ms: f64,
    pub poll_cycles: u64,
    pub tick_failures: u64,
}

/// Measures an operation into a histogram
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn record(self, histogram: &Histogram) -> Duration {
        let elapsed = self.start.elapsed();
        histogram.observe(elapsed);
        elapsed
    }
}
