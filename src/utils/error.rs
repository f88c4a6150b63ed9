//! Error types for the edgescan scanner
//!
//! This module defines the domain errors raised by each stage. Probe and
//! speed-test errors never leave the stage that produced them; they only
//! classify why a candidate was dropped or scored zero.

use std::time::Duration;
use thiserror::Error;
use tokio_native_tls::native_tls;

/// Reasons a single candidate fails the probe stage
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Candidate address is not a usable socket address
    #[error("Invalid candidate address: {0}")]
    InvalidAddress(String),

    /// TCP connection refused or failed
    #[error("TCP connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// TCP connection did not complete in time
    #[error("TCP connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Reachable, but slower than the configured delay threshold
    #[error("TCP latency {elapsed_ms} ms exceeds threshold {threshold_ms} ms")]
    DelayExceeded { elapsed_ms: u128, threshold_ms: u64 },

    /// TLS handshake on the dialed connection failed
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] native_tls::Error),

    /// Trace request could not be built from the configured host and path
    #[error("Invalid trace request: {0}")]
    Request(#[from] hyper::http::Error),

    /// HTTP exchange or body transfer failed
    #[error("Trace request failed: {0}")]
    Http(#[from] hyper::Error),

    /// Trace exchange exceeded its time budget
    #[error("Trace exchange timed out after {0:?}")]
    TraceTimeout(Duration),

    /// Response body is not a trace payload
    #[error("Trace marker not found in response")]
    MissingMarker,

    /// Trace payload lacks a required key
    #[error("Trace field missing or malformed: {0}")]
    MissingField(&'static str),
}

impl ProbeError {
    /// Short label used for drop counters and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) | Self::Connect(_) | Self::ConnectTimeout(_) => "dial_failed",
            Self::DelayExceeded { .. } => "delay_filtered",
            Self::Tls(_) | Self::Request(_) | Self::Http(_) | Self::TraceTimeout(_) => {
                "trace_failed"
            }
            Self::MissingMarker | Self::MissingField(_) => "signature_missing",
        }
    }
}

/// Reasons a speed test scores zero
#[derive(Error, Debug)]
pub enum SpeedTestError {
    /// Candidate address is not a usable socket address
    #[error("Invalid candidate address: {0}")]
    InvalidAddress(String),

    /// TCP connection refused or failed
    #[error("TCP connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// TLS handshake failed
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] native_tls::Error),

    /// Download request could not be built from the configured URL
    #[error("Invalid download request: {0}")]
    Request(#[from] hyper::http::Error),

    /// HTTP exchange or body transfer failed
    #[error("Download request failed: {0}")]
    Http(#[from] hyper::Error),

    /// Server answered with a non-success status
    #[error("Download rejected with status {0}")]
    Status(u16),

    /// No response before the duration cap
    #[error("Download timed out after {0:?}")]
    Timeout(Duration),

    /// Speed test URL could not be parsed
    #[error("Invalid speed test URL: {0}")]
    InvalidUrl(String),
}

/// Errors raised while parsing the candidate list
#[derive(Error, Debug)]
pub enum CandidateError {
    /// Line does not have the `<address> <port>` shape
    #[error("Malformed candidate line: {0}")]
    Malformed(String),

    /// Address part is neither an IP nor a CIDR range
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Port part is not a valid TCP port
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// CIDR range expands past the per-line limit
    #[error("Address range {range} has {hosts} hosts, limit is {limit}")]
    RangeTooLarge {
        range: String,
        hosts: u128,
        limit: u128,
    },
}

/// Errors raised while loading the location directory
#[derive(Error, Debug)]
pub enum LocationError {
    /// Local cache could not be read or written
    #[error("Location cache I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Remote table could not be fetched
    #[error("Failed to fetch location table from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Remote table answered with a non-success status
    #[error("Location table request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Table is not valid JSON of the expected shape
    #[error("Invalid location table: {0}")]
    Parse(#[from] serde_json::Error),
}
