mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edgescan::config::Config;

#[derive(Parser)]
#[command(
    name = "edgescan",
    version,
    about = "CDN edge IP scanner with latency probing and download speed ranking",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML configuration file (environment variables are used otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe candidates and write a ranked report
    Scan {
        /// Candidate list, one `<ip|cidr> <port>` per line
        #[arg(long, default_value = "ip.txt")]
        file: PathBuf,

        /// Report CSV path
        #[arg(long, default_value = "ip.csv")]
        outfile: PathBuf,

        /// Concurrent probes [default: 100]
        #[arg(long)]
        max: Option<usize>,

        /// Speed test workers, 0 disables the speed test [default: 5]
        #[arg(long)]
        speedtest: Option<usize>,

        /// Speed test download URL
        #[arg(long)]
        url: Option<String>,

        /// Use TLS for trace and download requests [default: true]
        #[arg(long)]
        tls: Option<bool>,

        /// Drop candidates slower than this many ms, 0 disables [default: 0]
        #[arg(long)]
        delay: Option<u64>,

        /// TCP connect timeout in ms [default: 1000]
        #[arg(long)]
        tcp_timeout_ms: Option<u64>,

        /// Trace request timeout in ms [default: 2000]
        #[arg(long)]
        trace_timeout_ms: Option<u64>,

        /// Download measurement cap in seconds [default: 10]
        #[arg(long)]
        speed_duration_secs: Option<u64>,

        /// Location table cache [default: locations.json]
        #[arg(long)]
        locations: Option<PathBuf>,

        /// Write Prometheus metrics to this file after the scan
        #[arg(long)]
        metrics_out: Option<PathBuf>,
    },

    /// Extract a per-country address list from a report
    Extract {
        /// Report CSV to read
        #[arg(short, long, default_value = "ip.csv")]
        input: PathBuf,

        /// Output path [default: input with .txt extension]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Entries per country, 0 keeps all
        #[arg(long, default_value = "0")]
        per_country: usize,

        /// Keep only entries faster than this many kB/s
        #[arg(long)]
        min_speed: Option<f64>,

        /// Location table cache [default: locations.json]
        #[arg(long)]
        locations: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => Config::from_env().context("Failed to load config from environment")?,
    };

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::info!("edgescan starting");

    match cli.command {
        Commands::Scan {
            file,
            outfile,
            max,
            speedtest,
            url,
            tls,
            delay,
            tcp_timeout_ms,
            trace_timeout_ms,
            speed_duration_secs,
            locations,
            metrics_out,
        } => {
            tracing::info!(
                file = %file.display(),
                outfile = %outfile.display(),
                max = ?max,
                speedtest = ?speedtest,
                "Starting scan command"
            );
            commands::scan(
                config,
                commands::ScanParams {
                    file,
                    outfile,
                    max,
                    speedtest,
                    url,
                    tls,
                    delay,
                    tcp_timeout_ms,
                    trace_timeout_ms,
                    speed_duration_secs,
                    locations,
                    metrics_out,
                },
            )
            .await?;
        }

        Commands::Extract {
            input,
            output,
            per_country,
            min_speed,
            locations,
        } => {
            tracing::info!(
                input = %input.display(),
                per_country = %per_country,
                min_speed = ?min_speed,
                "Starting extract command"
            );
            commands::extract(
                config,
                commands::ExtractParams {
                    input,
                    output,
                    per_country,
                    min_speed,
                    locations,
                },
            )
            .await?;
        }
    }

    tracing::info!("edgescan completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("edgescan=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("edgescan={level},warn"))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
