//! Candidate list reader
//!
//! The input file holds one entry per line, address and port separated by
//! whitespace:
//!
//! ```text
//! 104.16.1.1 443
//! 2606:4700::6810:101 2053
//! 172.64.36.0/30 8443
//! # comments and blank lines are ignored
//! ```
//!
//! A CIDR range expands to every address it contains, network and broadcast
//! addresses included. Malformed lines are skipped with a warning; an
//! unreadable file is an error.

use anyhow::{Context, Result};
use ipnet::{IpNet, Ipv4AddrRange, Ipv6AddrRange};
use std::net::IpAddr;
use std::path::Path;

use crate::models::Candidate;
use crate::utils::error::CandidateError;

/// Largest number of hosts a single CIDR line may expand to
pub const MAX_RANGE_HOSTS: u128 = 65_536;

/// Parse one line of the candidate file
///
/// # Errors
///
/// Returns a `CandidateError` describing why the line is malformed
pub fn parse_line(line: &str) -> Result<Vec<Candidate>, CandidateError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Vec::new());
    }

    let mut parts = line.split_whitespace();
    let (Some(address), Some(port), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(CandidateError::Malformed(line.to_string()));
    };

    let port: u16 = port
        .parse()
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| CandidateError::InvalidPort(port.to_string()))?;

    if address.contains('/') {
        let net: IpNet = address
            .parse()
            .map_err(|_| CandidateError::InvalidAddress(address.to_string()))?;
        return expand_range(net, port);
    }

    let ip: IpAddr = address
        .trim_matches(|c| c == '[' || c == ']')
        .parse()
        .map_err(|_| CandidateError::InvalidAddress(address.to_string()))?;

    Ok(vec![Candidate::new(ip.to_string(), port)])
}

fn expand_range(net: IpNet, port: u16) -> Result<Vec<Candidate>, CandidateError> {
    let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
    let hosts = 1u128.checked_shl(host_bits).unwrap_or(u128::MAX);
    if hosts > MAX_RANGE_HOSTS {
        return Err(CandidateError::RangeTooLarge {
            range: net.to_string(),
            hosts,
            limit: MAX_RANGE_HOSTS,
        });
    }

    let candidates = match net {
        IpNet::V4(net) => Ipv4AddrRange::new(net.network(), net.broadcast())
            .map(|ip| Candidate::new(ip.to_string(), port))
            .collect(),
        IpNet::V6(net) => Ipv6AddrRange::new(net.network(), net.broadcast())
            .map(|ip| Candidate::new(ip.to_string(), port))
            .collect(),
    };

    Ok(candidates)
}

/// Parse every line of `content`, skipping malformed ones
pub fn parse_candidates(content: &str) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        match parse_line(line) {
            Ok(parsed) => candidates.extend(parsed),
            Err(e) => {
                tracing::warn!(line = idx + 1, error = %e, "Skipping malformed candidate line");
            }
        }
    }

    candidates
}

/// Read the candidate file
///
/// # Errors
///
/// Returns an error if the file cannot be read
pub fn read_candidates(path: &Path) -> Result<Vec<Candidate>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read candidate file: {}", path.display()))?;

    let candidates = parse_candidates(&content);
    tracing::info!(path = %path.display(), count = candidates.len(), "Loaded candidates");
    Ok(candidates)
}
