// Core data structures for the edgescan pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::utils::error::ProbeError;

/// Address/port pair considered for probing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub address: String,
    pub port: u16,
}

impl Candidate {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Resolve to a socket address; only literal IPs are accepted
    pub fn socket_addr(&self) -> Result<SocketAddr, ProbeError> {
        let ip: IpAddr = self
            .address
            .trim_matches(|c| c == '[' || c == ']')
            .parse()
            .map_err(|_| ProbeError::InvalidAddress(self.address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') && !self.address.starts_with('[') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// One entry of the datacenter location table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Datacenter code (IATA airport code)
    pub iata: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    /// ISO country code of the datacenter
    #[serde(default)]
    pub cca2: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub region_zh: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city_zh: String,
    #[serde(default)]
    pub emoji: String,
}

/// Geographic fields attached to a probe result
///
/// All fields are empty when the datacenter code is not in the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub region: String,
    pub region_zh: String,
    pub city: String,
    pub city_zh: String,
    pub country: String,
    pub emoji: String,
}

impl GeoInfo {
    /// True when the directory lookup missed
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
            && self.region_zh.is_empty()
            && self.city.is_empty()
            && self.city_zh.is_empty()
            && self.country.is_empty()
            && self.emoji.is_empty()
    }
}

impl From<&LocationRecord> for GeoInfo {
    fn from(record: &LocationRecord) -> Self {
        Self {
            region: record.region.clone(),
            region_zh: record.region_zh.clone(),
            city: record.city.clone(),
            city_zh: record.city_zh.clone(),
            country: record.country.clone(),
            emoji: record.emoji.clone(),
        }
    }
}

/// Candidate that passed every probe-stage check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub candidate: Candidate,
    pub tcp_duration: Duration,
    /// Datacenter that answered the trace (`colo`)
    pub datacenter: String,
    /// Location code the edge reported for the client (`loc`)
    pub source_location: String,
    pub geo: GeoInfo,
    /// Display form of `tcp_duration`, e.g. `"42 ms"`
    pub latency: String,
}

impl ProbeResult {
    pub fn new(
        candidate: Candidate,
        tcp_duration: Duration,
        datacenter: impl Into<String>,
        source_location: impl Into<String>,
        geo: GeoInfo,
    ) -> Self {
        Self {
            candidate,
            tcp_duration,
            datacenter: datacenter.into(),
            source_location: source_location.into(),
            geo,
            latency: format!("{} ms", tcp_duration.as_millis()),
        }
    }
}

/// Probe result re-measured by the speed-test stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestResult {
    pub result: ProbeResult,
    /// Download throughput in kB/s; 0 when the re-probe failed
    pub download_speed_kbs: f64,
}

impl SpeedTestResult {
    /// Negative or non-finite speeds are stored as 0
    pub fn new(result: ProbeResult, download_speed_kbs: f64) -> Self {
        let download_speed_kbs = if download_speed_kbs.is_finite() && download_speed_kbs > 0.0 {
            download_speed_kbs
        } else {
            0.0
        };
        Self {
            result,
            download_speed_kbs,
        }
    }

    /// A failed re-probe keeps the candidate with zero throughput
    pub fn failed(result: ProbeResult) -> Self {
        Self::new(result, 0.0)
    }
}
