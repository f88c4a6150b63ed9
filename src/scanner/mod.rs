//! Two-stage edge scanning pipeline
//!
//! This module wires the probe stage, the result collector, the optional
//! speed-test stage and the ranker together:
//!
//! ```text
//! candidates ─▶ ProbePool ─▶ ResultCollector ─▶ SpeedTestPool? ─▶ Ranker
//! ```
//!
//! The stages run strictly one after the other; the speed test only starts
//! once every probe worker has exited.

pub mod probe;
pub mod ranker;
pub mod speedtest;
pub mod trace;
pub mod transport;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::Config;
use crate::locations::LocationDirectory;
use crate::metrics;
use crate::models::Candidate;

pub use probe::{ProbeConfig, ProbePool, ProbeSnapshot, ProbeStats};
pub use ranker::Ranking;
pub use speedtest::{SpeedTestConfig, SpeedTestPool};
pub use transport::{DownloadSample, EdgeConnection, EdgeTransport, HttpTransport};

/// Completed scan
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Final ordered results
    pub ranking: Ranking,

    /// Probe stage statistics
    pub probe_stats: ProbeSnapshot,

    /// Number of emitted probe results
    pub valid_count: u64,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Wall-clock time of the whole run
    pub elapsed: Duration,
}

/// Terminal outcome of a scan
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// No candidate passed the probe stage; nothing to rank or report
    NoValidCandidates {
        probe_stats: ProbeSnapshot,
        elapsed: Duration,
    },

    /// At least one candidate passed
    Completed(ScanReport),
}

impl ScanOutcome {
    /// Probe statistics of either outcome
    pub fn probe_stats(&self) -> &ProbeSnapshot {
        match self {
            Self::NoValidCandidates { probe_stats, .. } => probe_stats,
            Self::Completed(report) => &report.probe_stats,
        }
    }
}

/// Main scanner structure
pub struct Scanner {
    probe: ProbeConfig,
    speed_test: SpeedTestConfig,
    transport: Arc<dyn EdgeTransport>,
    directory: Arc<LocationDirectory>,
}

impl Scanner {
    /// Create a scanner backed by the HTTP transport
    pub fn new(config: &Config, directory: LocationDirectory) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let transport =
            HttpTransport::from_config(config).context("Failed to create HTTP transport")?;

        Ok(Self::with_transport(
            ProbeConfig::from(config),
            SpeedTestConfig::from(config),
            Arc::new(transport),
            Arc::new(directory),
        ))
    }

    /// Create a scanner over any transport
    pub fn with_transport(
        probe: ProbeConfig,
        speed_test: SpeedTestConfig,
        transport: Arc<dyn EdgeTransport>,
        directory: Arc<LocationDirectory>,
    ) -> Self {
        Self {
            probe,
            speed_test,
            transport,
            directory,
        }
    }

    /// Run both stages over the candidate list
    pub async fn run(&self, candidates: Vec<Candidate>) -> ScanOutcome {
        let started = Instant::now();
        let started_at = Utc::now();

        let pool = ProbePool::new(
            self.probe.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.directory),
        );
        let collected = {
            let _timer = metrics::start_stage_timer("probe");
            pool.run(candidates).await
        };
        metrics::set_valid_candidates(collected.valid_count);
        let probe_stats = pool.stats().snapshot(collected.valid_count);

        if collected.results.is_empty() {
            tracing::info!("No valid candidates found");
            return ScanOutcome::NoValidCandidates {
                probe_stats,
                elapsed: started.elapsed(),
            };
        }

        tracing::info!(valid = collected.valid_count, "Probe stage found valid candidates");

        let ranking = if self.speed_test.is_enabled() {
            let speed_pool = SpeedTestPool::new(self.speed_test.clone(), Arc::clone(&self.transport));
            let measured = {
                let _timer = metrics::start_stage_timer("speed_test");
                speed_pool.run(collected.results).await
            };
            ranker::rank_by_speed(measured)
        } else {
            ranker::rank_probed(collected.results)
        };

        ScanOutcome::Completed(ScanReport {
            ranking,
            probe_stats,
            valid_count: collected.valid_count,
            started_at,
            elapsed: started.elapsed(),
        })
    }
}
