//! Configuration management for the edgescan scanner
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Command-line flags are layered on top by the
//! binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default trace host; the candidate address is substituted at connect time
pub const DEFAULT_TRACE_HOST: &str = "speed.cloudflare.com";

/// Default diagnostic path on the trace host
pub const DEFAULT_TRACE_PATH: &str = "/cdn-cgi/trace";

/// User agent sent with trace and speed test requests
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// Default large-payload endpoint used for speed tests
pub const DEFAULT_SPEED_TEST_URL: &str = "speed.cloudflare.com/__down?bytes=500000000";

/// Default location table source
pub const DEFAULT_LOCATIONS_URL: &str = "https://locations-adw.pages.dev/";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scanner configuration
    pub scan: ScanConfig,

    /// Location table configuration
    pub locations: LocationsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scanner-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Maximum number of concurrent probes
    pub max_probe_concurrency: usize,

    /// Number of speed test workers (0 disables the stage)
    pub speed_test_concurrency: usize,

    /// TCP connect timeout in milliseconds
    pub tcp_timeout_ms: u64,

    /// Budget for the whole trace exchange in milliseconds
    pub trace_read_timeout_ms: u64,

    /// Drop candidates slower than this many ms (0 disables)
    pub delay_threshold_ms: u64,

    /// Use HTTPS for trace and speed test requests
    pub enable_tls: bool,

    /// Large-payload URL for speed tests; scheme is taken from `enable_tls`
    pub speed_test_url: String,

    /// Cap on how long a single download is measured, in seconds
    pub speed_test_duration_secs: u64,

    /// Host name sent in SNI and the Host header
    pub trace_host: String,

    /// Trace path requested on every candidate
    pub trace_path: String,

    /// Substring a trace body must contain; `uag=<user_agent>` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_marker: Option<String>,

    /// User agent string
    pub user_agent: String,
}

/// Marker a trace body carries when the edge echoes `user_agent` back
pub fn trace_marker_for(user_agent: &str) -> String {
    format!("uag={user_agent}")
}

/// Location table configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationsConfig {
    /// Local cache of the location table
    pub cache_path: PathBuf,

    /// Remote source used when the cache is missing
    pub source_url: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let scan = ScanConfig {
            max_probe_concurrency: env_parse(
                "EDGESCAN_MAX_CONCURRENCY",
                defaults.scan.max_probe_concurrency,
            ),
            speed_test_concurrency: env_parse(
                "EDGESCAN_SPEED_TEST_CONCURRENCY",
                defaults.scan.speed_test_concurrency,
            ),
            tcp_timeout_ms: env_parse("EDGESCAN_TCP_TIMEOUT_MS", defaults.scan.tcp_timeout_ms),
            trace_read_timeout_ms: env_parse(
                "EDGESCAN_TRACE_TIMEOUT_MS",
                defaults.scan.trace_read_timeout_ms,
            ),
            delay_threshold_ms: env_parse("EDGESCAN_DELAY_MS", defaults.scan.delay_threshold_ms),
            enable_tls: env_parse("EDGESCAN_TLS", defaults.scan.enable_tls),
            speed_test_url: std::env::var("EDGESCAN_SPEED_TEST_URL")
                .unwrap_or(defaults.scan.speed_test_url),
            speed_test_duration_secs: env_parse(
                "EDGESCAN_SPEED_TEST_DURATION",
                defaults.scan.speed_test_duration_secs,
            ),
            trace_host: std::env::var("EDGESCAN_TRACE_HOST").unwrap_or(defaults.scan.trace_host),
            trace_path: std::env::var("EDGESCAN_TRACE_PATH").unwrap_or(defaults.scan.trace_path),
            trace_marker: std::env::var("EDGESCAN_TRACE_MARKER").ok(),
            user_agent: std::env::var("EDGESCAN_USER_AGENT").unwrap_or(defaults.scan.user_agent),
        };

        let locations = LocationsConfig {
            cache_path: std::env::var("EDGESCAN_LOCATIONS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.locations.cache_path),
            source_url: std::env::var("EDGESCAN_LOCATIONS_URL")
                .unwrap_or(defaults.locations.source_url),
        };

        let logging = LoggingConfig {
            level: std::env::var("EDGESCAN_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: std::env::var("EDGESCAN_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            scan,
            locations,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scan.max_probe_concurrency == 0 {
            anyhow::bail!("max_probe_concurrency must be greater than 0");
        }

        if self.scan.tcp_timeout_ms == 0 {
            anyhow::bail!("tcp_timeout_ms must be greater than 0");
        }

        if self.scan.trace_read_timeout_ms == 0 {
            anyhow::bail!("trace_read_timeout_ms must be greater than 0");
        }

        if self.scan.speed_test_concurrency > 0 {
            if self.scan.speed_test_duration_secs == 0 {
                anyhow::bail!("speed_test_duration_secs must be greater than 0");
            }
            crate::scanner::transport::speed_test_url(
                &self.scan.speed_test_url,
                self.scan.enable_tls,
            )
            .context("Invalid speed_test_url")?;
        }

        if self.scan.trace_host.trim().is_empty() {
            anyhow::bail!("trace_host must not be empty");
        }

        if !self.scan.trace_path.starts_with('/') {
            anyhow::bail!("trace_path must start with '/'");
        }

        if self.scan.user_agent.trim().is_empty() {
            anyhow::bail!("user_agent must not be empty");
        }

        if self.trace_marker().trim().is_empty() {
            anyhow::bail!("trace_marker must not be empty");
        }

        Ok(())
    }

    /// Marker a trace body must contain to count as a genuine edge reply
    #[must_use]
    pub fn trace_marker(&self) -> String {
        self.scan
            .trace_marker
            .clone()
            .unwrap_or_else(|| trace_marker_for(&self.scan.user_agent))
    }

    /// Get TCP connect timeout as Duration
    #[must_use]
    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_millis(self.scan.tcp_timeout_ms)
    }

    /// Get trace exchange budget as Duration
    #[must_use]
    pub fn trace_read_timeout(&self) -> Duration {
        Duration::from_millis(self.scan.trace_read_timeout_ms)
    }

    /// Get speed test duration cap as Duration
    #[must_use]
    pub fn speed_test_duration(&self) -> Duration {
        Duration::from_secs(self.scan.speed_test_duration_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_probe_concurrency: 100,
            speed_test_concurrency: 5,
            tcp_timeout_ms: 1000,
            trace_read_timeout_ms: 2000,
            delay_threshold_ms: 0,
            enable_tls: true,
            speed_test_url: String::from(DEFAULT_SPEED_TEST_URL),
            speed_test_duration_secs: 10,
            trace_host: String::from(DEFAULT_TRACE_HOST),
            trace_path: String::from(DEFAULT_TRACE_PATH),
            trace_marker: None,
            user_agent: String::from(DEFAULT_USER_AGENT),
        }
    }
}

impl Default for LocationsConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from("locations.json"),
            source_url: String::from(DEFAULT_LOCATIONS_URL),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            locations: LocationsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
