//! Prometheus metrics for the scanner
//!
//! This module tracks:
//! - Probe stage: outcome per candidate, TCP connect latency
//! - Speed-test stage: measured download throughput
//! - Stage timings for the whole run
//!
//! # Usage
//!
//! Call `init_metrics()` once at startup. If initialization fails or never
//! happens, every recording function is a no-op.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec, CounterVec,
    Encoder, Gauge, Histogram, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all scanner metrics
struct ScanMetrics {
    probe_outcomes: CounterVec,
    tcp_latency: Histogram,
    download_speed: Histogram,
    stage_duration: HistogramVec,
    valid_candidates: Gauge,
}

static SCAN_METRICS: OnceLock<ScanMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Register all Prometheus metrics
///
/// Idempotent: later calls return `Ok(())` without registering again.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = edgescan::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = ScanMetrics {
        probe_outcomes: register_counter_vec!(
            "edgescan_probe_outcomes_total",
            "Probed candidates by outcome",
            &["outcome"]
        )?,
        tcp_latency: register_histogram!(
            "edgescan_tcp_connect_seconds",
            "TCP connect latency of valid candidates in seconds",
            vec![0.01, 0.025, 0.05, 0.1, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0]
        )?,
        download_speed: register_histogram!(
            "edgescan_download_speed_kbs",
            "Measured download speed in kB/s",
            vec![0.0, 100.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 25000.0, 50000.0]
        )?,
        stage_duration: register_histogram_vec!(
            "edgescan_stage_duration_seconds",
            "Wall-clock time per scan stage in seconds",
            &["stage"],
            vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
        )?,
        valid_candidates: register_gauge!(
            "edgescan_valid_candidates",
            "Candidates that passed the probe stage in the last run"
        )?,
    };

    SCAN_METRICS
        .set(metrics)
        .map_err(|_| "Scan metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SCAN_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the outcome of one probe (`valid` or a drop reason)
pub fn record_probe_outcome(outcome: &str) {
    if let Some(m) = SCAN_METRICS.get() {
        m.probe_outcomes.with_label_values(&[outcome]).inc();
    }
}

pub fn observe_tcp_latency(latency: Duration) {
    if let Some(m) = SCAN_METRICS.get() {
        m.tcp_latency.observe(latency.as_secs_f64());
    }
}

pub fn observe_download_speed(kilobytes_per_second: f64) {
    if let Some(m) = SCAN_METRICS.get() {
        m.download_speed.observe(kilobytes_per_second);
    }
}

/// Set the valid candidate count of the current run
pub fn set_valid_candidates(count: u64) {
    if let Some(m) = SCAN_METRICS.get() {
        m.valid_candidates.set(count as f64);
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start timing a scan stage (`probe` or `speed_test`)
pub fn start_stage_timer(stage: &str) -> MetricsTimer {
    match SCAN_METRICS.get() {
        Some(m) => MetricsTimer::new(m.stage_duration.with_label_values(&[stage]).start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
