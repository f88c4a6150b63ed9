//! Speed-test stage: download throughput for probe survivors
//!
//! A fixed set of workers pulls jobs from one shared queue, mirroring the
//! fetcher workers of a crawl pipeline. A failed download scores 0 kB/s and
//! the candidate stays in the output.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::metrics;
use crate::models::{ProbeResult, SpeedTestResult};
use crate::scanner::transport::EdgeTransport;

/// Speed-test stage configuration
#[derive(Debug, Clone)]
pub struct SpeedTestConfig {
    /// Number of workers (0 disables the stage)
    pub concurrency: usize,

    /// Cap on how long each download is measured
    pub duration: Duration,
}

impl SpeedTestConfig {
    /// Whether the stage should run at all
    pub fn is_enabled(&self) -> bool {
        self.concurrency > 0
    }
}

impl Default for SpeedTestConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            duration: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for SpeedTestConfig {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.scan.speed_test_concurrency,
            duration: config.speed_test_duration(),
        }
    }
}

/// Queue entry; `seq` is the position the result was fed in
#[derive(Debug)]
struct SpeedJob {
    seq: usize,
    result: ProbeResult,
}

/// Fixed-size speed test worker pool
pub struct SpeedTestPool {
    config: SpeedTestConfig,
    transport: Arc<dyn EdgeTransport>,
}

impl SpeedTestPool {
    /// Create a new pool
    pub fn new(config: SpeedTestConfig, transport: Arc<dyn EdgeTransport>) -> Self {
        Self { config, transport }
    }

    /// Measure every result
    ///
    /// Returns one entry per input, in input order. Ranking is left to the
    /// caller.
    pub async fn run(&self, results: Vec<ProbeResult>) -> Vec<SpeedTestResult> {
        let total = results.len();
        let workers = self.config.concurrency.max(1);

        tracing::info!(
            total,
            workers,
            duration_secs = self.config.duration.as_secs(),
            "Starting speed test stage"
        );

        let (job_tx, job_rx) = mpsc::unbounded_channel::<SpeedJob>();
        for (seq, result) in results.into_iter().enumerate() {
            if job_tx.send(SpeedJob { seq, result }).is_err() {
                tracing::error!("Speed test queue closed");
                break;
            }
        }
        drop(job_tx);

        let measured = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let handles = self.spawn_workers(job_rx, Arc::clone(&measured));

        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Speed test worker panicked");
            }
        }

        let mut measured = std::mem::take(&mut *measured.lock().await);
        measured.sort_by_key(|(seq, _)| *seq);

        tracing::info!(measured = measured.len(), "Speed test stage completed");

        measured.into_iter().map(|(_, result)| result).collect()
    }

    /// Spawn worker tasks
    fn spawn_workers(
        &self,
        job_rx: mpsc::UnboundedReceiver<SpeedJob>,
        measured: Arc<Mutex<Vec<(usize, SpeedTestResult)>>>,
    ) -> Vec<JoinHandle<()>> {
        let job_rx = Arc::new(Mutex::new(job_rx));
        let workers = self.config.concurrency.max(1);
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let measured = Arc::clone(&measured);
            let transport = Arc::clone(&self.transport);
            let duration = self.config.duration;

            let handle = tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = job_rx.lock().await;
                        rx.recv().await
                    };

                    let Some(job) = job else {
                        break;
                    };

                    let candidate = job.result.candidate.clone();
                    tracing::info!(worker_id, candidate = %candidate, "Testing download speed");

                    let tested = match transport.download(&candidate, duration).await {
                        Ok(sample) => SpeedTestResult::new(job.result, sample.kilobytes_per_second()),
                        Err(e) => {
                            tracing::warn!(candidate = %candidate, error = %e, "Speed test failed");
                            SpeedTestResult::failed(job.result)
                        }
                    };
                    metrics::observe_download_speed(tested.download_speed_kbs);
                    tracing::debug!(
                        worker_id,
                        candidate = %tested.result.candidate,
                        speed_kbs = tested.download_speed_kbs,
                        "Speed test finished"
                    );

                    measured.lock().await.push((job.seq, tested));
                }

                tracing::debug!(worker_id, "Speed test worker shutting down");
            });

            handles.push(handle);
        }

        handles
    }
}
