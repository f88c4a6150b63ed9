//! edgescan - CDN edge IP scanner
//!
//! Probes candidate addresses of a CDN edge network, keeps the ones that
//! answer the edge trace endpoint in time, optionally measures their download
//! throughput, and writes a ranked report.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`candidates`] - Candidate list reader (addresses and CIDR ranges)
//! - [`locations`] - Datacenter location directory
//! - [`scanner`] - Probe stage, speed-test stage and ranking
//! - [`report`] - CSV report and per-country extraction
//! - [`models`] - Core data structures and types
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use edgescan::config::Config;
//! use edgescan::locations::LocationDirectory;
//! use edgescan::scanner::{ScanOutcome, Scanner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let directory = LocationDirectory::load_or_fetch(
//!         &config.locations.cache_path,
//!         &config.locations.source_url,
//!     )
//!     .await?;
//!     let candidates = edgescan::candidates::read_candidates("ip.txt".as_ref())?;
//!
//!     let scanner = Scanner::new(&config, directory)?;
//!     if let ScanOutcome::Completed(report) = scanner.run(candidates).await {
//!         println!("{} valid candidates", report.valid_count);
//!     }
//!     Ok(())
//! }
//! ```

pub mod candidates;
pub mod config;
pub mod error;
pub mod locations;
pub mod metrics;
pub mod models;
pub mod report;
pub mod scanner;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::locations::LocationDirectory;
    pub use crate::models::{Candidate, GeoInfo, ProbeResult, SpeedTestResult};
    pub use crate::scanner::{Ranking, ScanOutcome, ScanReport, Scanner};
}

// Direct re-exports for convenience
pub use models::{Candidate, ProbeResult, SpeedTestResult};
