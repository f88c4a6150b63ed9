//! Probe stage: bounded-concurrency reachability and trace checks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  permit   ┌─────────────┐  unbounded mpsc  ┌─────────────┐
//! │ Candidates  │──────────▶│   Probe     │─────────────────▶│   Result    │
//! │ (in order)  │ Semaphore │   Workers   │   ProbeResult    │  Collector  │
//! └─────────────┘   (N)     └─────────────┘                  └─────────────┘
//!                                  │                                │
//!                             ProbeStats                      valid_count
//!                       (drops, in-flight, peak)             (AtomicU64)
//! ```
//!
//! A worker task is only spawned once a semaphore permit is held, so at most
//! N probes exist at any time. The permit moves into the task and is released
//! when the task ends, whatever the outcome. Failures are classified and
//! counted, never propagated.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::config::Config;
use crate::locations::LocationDirectory;
use crate::metrics;
use crate::models::{Candidate, GeoInfo, ProbeResult};
use crate::scanner::trace::TraceInfo;
use crate::scanner::transport::EdgeTransport;
use crate::utils::error::ProbeError;

// ============================================================================
// Configuration
// ============================================================================

/// Probe stage configuration
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Maximum number of probes in flight
    pub max_concurrency: usize,

    /// TCP connect deadline
    pub tcp_timeout: Duration,

    /// Budget for the trace request and body read
    pub trace_timeout: Duration,

    /// Latency ceiling in milliseconds (0 disables)
    pub delay_threshold_ms: u64,

    /// Substring a trace body must contain
    pub trace_marker: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 100,
            tcp_timeout: Duration::from_secs(1),
            trace_timeout: Duration::from_secs(2),
            delay_threshold_ms: 0,
            trace_marker: crate::config::trace_marker_for(crate::config::DEFAULT_USER_AGENT),
        }
    }
}

impl From<&Config> for ProbeConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrency: config.scan.max_probe_concurrency,
            tcp_timeout: config.tcp_timeout(),
            trace_timeout: config.trace_read_timeout(),
            delay_threshold_ms: config.scan.delay_threshold_ms,
            trace_marker: config.trace_marker(),
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Probe stage statistics (thread-safe)
#[derive(Debug, Default)]
pub struct ProbeStats {
    /// Candidates handed to a worker
    pub attempted: AtomicU64,

    /// TCP dial failed or timed out
    pub dial_failed: AtomicU64,

    /// Reachable but slower than the delay threshold
    pub delay_filtered: AtomicU64,

    /// Trace request failed or timed out
    pub trace_failed: AtomicU64,

    /// Trace body lacked the marker or a required key
    pub signature_missing: AtomicU64,

    /// Workers currently holding a slot
    pub in_flight: AtomicUsize,

    /// Highest `in_flight` value observed
    pub peak_in_flight: AtomicUsize,
}

impl ProbeStats {
    /// Create new stats counter
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark a slot as occupied until the guard drops
    pub fn enter_slot(self: &Arc<Self>) -> SlotGuard {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        SlotGuard {
            stats: Arc::clone(self),
        }
    }

    /// Record a dropped candidate under its reason
    pub fn record_drop(&self, error: &ProbeError) {
        let counter = match error.reason() {
            "dial_failed" => &self.dial_failed,
            "delay_filtered" => &self.delay_filtered,
            "trace_failed" => &self.trace_failed,
            _ => &self.signature_missing,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self, valid: u64) -> ProbeSnapshot {
        ProbeSnapshot {
            attempted: self.attempted.load(Ordering::Relaxed),
            valid,
            dial_failed: self.dial_failed.load(Ordering::Relaxed),
            delay_filtered: self.delay_filtered.load(Ordering::Relaxed),
            trace_failed: self.trace_failed.load(Ordering::Relaxed),
            signature_missing: self.signature_missing.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
        }
    }
}

/// Releases an in-flight slot on drop
#[derive(Debug)]
pub struct SlotGuard {
    stats: Arc<ProbeStats>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Snapshot of probe statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSnapshot {
    pub attempted: u64,
    pub valid: u64,
    pub dial_failed: u64,
    pub delay_filtered: u64,
    pub trace_failed: u64,
    pub signature_missing: u64,
    pub peak_in_flight: usize,
}

impl ProbeSnapshot {
    /// Candidates dropped for any reason
    pub fn dropped(&self) -> u64 {
        self.dial_failed + self.delay_filtered + self.trace_failed + self.signature_missing
    }
}

// ============================================================================
// Result Collector
// ============================================================================

/// Unbounded hand-off for probe results plus the valid counter
///
/// Producers never block. [`ResultCollector::finish`] must only be called
/// after every worker has exited.
#[derive(Debug)]
pub struct ResultCollector {
    tx: mpsc::UnboundedSender<ProbeResult>,
    rx: mpsc::UnboundedReceiver<ProbeResult>,
    valid_count: Arc<AtomicU64>,
}

/// Producer side of the collector, one per worker
#[derive(Debug, Clone)]
pub struct CollectorHandle {
    tx: mpsc::UnboundedSender<ProbeResult>,
    valid_count: Arc<AtomicU64>,
}

impl CollectorHandle {
    /// Hand over a result and count it
    pub fn emit(&self, result: ProbeResult) -> bool {
        if self.tx.send(result).is_err() {
            return false;
        }
        self.valid_count.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// Drained collector contents
#[derive(Debug, Clone, Default)]
pub struct Collected {
    /// Results in the order they were received
    pub results: Vec<ProbeResult>,

    /// Number of emitted results
    pub valid_count: u64,
}

impl ResultCollector {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            valid_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// New producer handle
    pub fn handle(&self) -> CollectorHandle {
        CollectorHandle {
            tx: self.tx.clone(),
            valid_count: Arc::clone(&self.valid_count),
        }
    }

    /// Close the collector and drain everything that was emitted
    pub async fn finish(self) -> Collected {
        let Self {
            tx,
            mut rx,
            valid_count,
        } = self;
        drop(tx);

        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }

        Collected {
            results,
            valid_count: valid_count.load(Ordering::SeqCst),
        }
    }
}

impl Default for ResultCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Single probe
// ============================================================================

/// Run every probe-stage check against one candidate
///
/// # Errors
///
/// Returns the `ProbeError` describing the first check that failed
pub async fn probe_candidate(
    transport: &dyn EdgeTransport,
    directory: &LocationDirectory,
    config: &ProbeConfig,
    candidate: &Candidate,
) -> Result<ProbeResult, ProbeError> {
    let connection = transport.dial(candidate, config.tcp_timeout).await?;
    let tcp_duration = connection.connect_time;
    if tcp_duration > config.tcp_timeout {
        return Err(ProbeError::ConnectTimeout(config.tcp_timeout));
    }

    let elapsed_ms = tcp_duration.as_millis();
    if config.delay_threshold_ms > 0 && elapsed_ms > u128::from(config.delay_threshold_ms) {
        return Err(ProbeError::DelayExceeded {
            elapsed_ms,
            threshold_ms: config.delay_threshold_ms,
        });
    }

    let body = tokio::time::timeout(
        config.trace_timeout,
        transport.fetch_trace(candidate, connection),
    )
    .await
    .map_err(|_| ProbeError::TraceTimeout(config.trace_timeout))??;

    let trace = TraceInfo::parse(&body, &config.trace_marker)?;

    let geo = directory
        .lookup(&trace.colo)
        .map(GeoInfo::from)
        .unwrap_or_default();

    Ok(ProbeResult::new(
        candidate.clone(),
        tcp_duration,
        trace.colo,
        trace.loc,
        geo,
    ))
}

// ============================================================================
// Worker pool
// ============================================================================

/// Bounded-concurrency probe pool
pub struct ProbePool {
    config: ProbeConfig,
    transport: Arc<dyn EdgeTransport>,
    directory: Arc<LocationDirectory>,
    stats: Arc<ProbeStats>,
}

impl ProbePool {
    /// Create a new pool
    pub fn new(
        config: ProbeConfig,
        transport: Arc<dyn EdgeTransport>,
        directory: Arc<LocationDirectory>,
    ) -> Self {
        Self {
            config,
            transport,
            directory,
            stats: ProbeStats::new(),
        }
    }

    /// Shared statistics of this pool
    pub fn stats(&self) -> Arc<ProbeStats> {
        Arc::clone(&self.stats)
    }

    /// Probe every candidate and collect the survivors
    ///
    /// Returns after every worker has finished. Result order follows probe
    /// completion, not candidate order.
    pub async fn run(&self, candidates: Vec<Candidate>) -> Collected {
        let max_concurrency = self.config.max_concurrency.max(1);

        tracing::info!(
            total = candidates.len(),
            max_concurrency,
            tcp_timeout_ms = self.config.tcp_timeout.as_millis() as u64,
            delay_threshold_ms = self.config.delay_threshold_ms,
            "Starting probe stage"
        );

        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let collector = ResultCollector::new();
        let mut workers = JoinSet::new();

        for candidate in candidates {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!("Probe semaphore closed");
                    break;
                }
            };

            let transport = Arc::clone(&self.transport);
            let directory = Arc::clone(&self.directory);
            let config = self.config.clone();
            let stats = Arc::clone(&self.stats);
            let handle = collector.handle();

            workers.spawn(async move {
                let _permit = permit;
                let _slot = stats.enter_slot();
                stats.attempted.fetch_add(1, Ordering::Relaxed);

                match probe_candidate(&*transport, &directory, &config, &candidate).await {
                    Ok(result) => {
                        tracing::info!(
                            candidate = %result.candidate,
                            colo = %result.datacenter,
                            city = %result.geo.city,
                            latency_ms = result.tcp_duration.as_millis() as u64,
                            "Found valid candidate"
                        );
                        metrics::record_probe_outcome("valid");
                        metrics::observe_tcp_latency(result.tcp_duration);
                        handle.emit(result);
                    }
                    Err(e) => {
                        tracing::debug!(candidate = %candidate, reason = e.reason(), error = %e, "Candidate dropped");
                        metrics::record_probe_outcome(e.reason());
                        stats.record_drop(&e);
                    }
                }
            });

            // Reap finished workers so the set only holds live tasks
            while let Some(joined) = workers.try_join_next() {
                log_join_error(joined);
            }
        }

        while let Some(joined) = workers.join_next().await {
            log_join_error(joined);
        }

        let collected = collector.finish().await;
        let snapshot = self.stats.snapshot(collected.valid_count);

        tracing::info!(
            attempted = snapshot.attempted,
            valid = snapshot.valid,
            dial_failed = snapshot.dial_failed,
            delay_filtered = snapshot.delay_filtered,
            trace_failed = snapshot.trace_failed,
            signature_missing = snapshot.signature_missing,
            peak_in_flight = snapshot.peak_in_flight,
            "Probe stage completed"
        );

        collected
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::warn!(error = %e, "Probe worker panicked");
    }
}

// ============================================================================
// Tests
// ============================================================================
