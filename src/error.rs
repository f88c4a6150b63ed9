//! Unified error handling for the edgescan crate
//!
//! Per-candidate failures ([`ProbeError`], [`SpeedTestError`]) are absorbed
//! inside the scanner and only classify why a candidate was dropped or scored
//! zero. [`Error`] covers what reaches a caller: building the transport and
//! reading or writing report files. The binary wraps these with `anyhow`
//! context and aborts the run.

use std::io;
use thiserror::Error;
use tokio_native_tls::native_tls;

pub use crate::utils::error::{CandidateError, LocationError, ProbeError, SpeedTestError};

/// Unified error type for the edgescan crate
#[derive(Error, Debug)]
pub enum Error {
    /// Speed test endpoint is unusable
    #[error("Speed test error: {0}")]
    SpeedTest(#[from] SpeedTestError),

    /// TLS connector could not be created
    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CSV read/write errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other(context.into())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
