use anyhow::{Context, Result};
use std::path::PathBuf;

use edgescan::candidates::read_candidates;
use edgescan::config::Config;
use edgescan::locations::LocationDirectory;
use edgescan::metrics;
use edgescan::report::write_report;
use edgescan::scanner::{ProbeSnapshot, ScanOutcome, Scanner};

/// Command-line overrides for a scan; `None` keeps the configured value
#[derive(Debug, Clone, Default)]
pub struct ScanParams {
    pub file: PathBuf,
    pub outfile: PathBuf,
    pub max: Option<usize>,
    pub speedtest: Option<usize>,
    pub url: Option<String>,
    pub tls: Option<bool>,
    pub delay: Option<u64>,
    pub tcp_timeout_ms: Option<u64>,
    pub trace_timeout_ms: Option<u64>,
    pub speed_duration_secs: Option<u64>,
    pub locations: Option<PathBuf>,
    pub metrics_out: Option<PathBuf>,
}

impl ScanParams {
    fn apply(&self, config: &mut Config) {
        let scan = &mut config.scan;
        if let Some(max) = self.max {
            scan.max_probe_concurrency = max;
        }
        if let Some(speedtest) = self.speedtest {
            scan.speed_test_concurrency = speedtest;
        }
        if let Some(url) = &self.url {
            scan.speed_test_url = url.clone();
        }
        if let Some(tls) = self.tls {
            scan.enable_tls = tls;
        }
        if let Some(delay) = self.delay {
            scan.delay_threshold_ms = delay;
        }
        if let Some(ms) = self.tcp_timeout_ms {
            scan.tcp_timeout_ms = ms;
        }
        if let Some(ms) = self.trace_timeout_ms {
            scan.trace_read_timeout_ms = ms;
        }
        if let Some(secs) = self.speed_duration_secs {
            scan.speed_test_duration_secs = secs;
        }
        if let Some(path) = &self.locations {
            config.locations.cache_path = path.clone();
        }
    }
}

/// Run a full scan and write the report
pub async fn scan(mut config: Config, params: ScanParams) -> Result<()> {
    params.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    if params.metrics_out.is_some() {
        if let Err(e) = metrics::init_metrics() {
            tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
        }
    }

    println!("Starting Edge Scan");
    println!("==================");
    println!("  Candidates: {}", params.file.display());
    println!("  Output: {}", params.outfile.display());
    println!("  Probe concurrency: {}", config.scan.max_probe_concurrency);
    println!(
        "  Speed test: {}",
        if config.scan.speed_test_concurrency > 0 {
            format!("{} workers", config.scan.speed_test_concurrency)
        } else {
            "disabled".to_string()
        }
    );
    println!("  TLS: {}", config.scan.enable_tls);
    if config.scan.delay_threshold_ms > 0 {
        println!("  Delay limit: {} ms", config.scan.delay_threshold_ms);
    }

    let candidates = read_candidates(&params.file)?;
    if candidates.is_empty() {
        tracing::warn!(path = %params.file.display(), "Candidate file contains no usable entries");
    }

    let directory = LocationDirectory::load_or_fetch(
        &config.locations.cache_path,
        &config.locations.source_url,
    )
    .await
    .context("Failed to load location table")?;

    let scanner = Scanner::new(&config, directory)?;
    let outcome = scanner.run(candidates).await;

    match &outcome {
        ScanOutcome::NoValidCandidates {
            probe_stats,
            elapsed,
        } => {
            println!("\nNo valid candidates found");
            print_probe_stats(probe_stats);
            println!("Elapsed: {:.2}s", elapsed.as_secs_f64());
        }
        ScanOutcome::Completed(report) => {
            write_report(&params.outfile, &report.ranking, config.scan.enable_tls)
                .with_context(|| format!("Failed to write report: {}", params.outfile.display()))?;

            println!("\nScan Summary");
            println!("============");
            println!("Started: {}", report.started_at.to_rfc3339());
            println!("Valid candidates: {}", report.valid_count);
            print_probe_stats(&report.probe_stats);
            println!("Report: {}", params.outfile.display());
            println!("Elapsed: {:.2}s", report.elapsed.as_secs_f64());
        }
    }

    if let Some(path) = &params.metrics_out {
        write_metrics(path)?;
    }

    Ok(())
}

fn print_probe_stats(stats: &ProbeSnapshot) {
    println!("\nProbe Stats");
    println!("-----------");
    println!("Attempted: {}", stats.attempted);
    println!("Valid: {}", stats.valid);
    println!("Dropped: {}", stats.dropped());
    println!("Dial failed: {}", stats.dial_failed);
    println!("Delay filtered: {}", stats.delay_filtered);
    println!("Trace failed: {}", stats.trace_failed);
    println!("Signature missing: {}", stats.signature_missing);
    println!("Peak in flight: {}", stats.peak_in_flight);
}

fn write_metrics(path: &std::path::Path) -> Result<()> {
    let text = metrics::encode_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {e}"))?;
    edgescan::utils::ensure_parent_dir(path)?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write metrics: {}", path.display()))?;
    tracing::info!(path = %path.display(), "Metrics written");
    Ok(())
}
