//! Trace payload parsing
//!
//! The trace endpoint answers with newline-separated `key=value` pairs:
//!
//! ```text
//! fl=29f1
//! h=speed.cloudflare.com
//! ip=203.0.113.7
//! ts=1718000000.123
//! visit_scheme=https
//! uag=Mozilla/5.0
//! colo=NRT
//! http=http/1.1
//! loc=JP
//! tls=TLSv1.3
//! ```
//!
//! Only `colo` and `loc` are extracted; every other key is ignored.

use crate::utils::error::ProbeError;

/// Edge metadata extracted from a trace body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceInfo {
    /// Datacenter that served the request
    pub colo: String,
    /// Location code the edge assigned to the client
    pub loc: String,
}

impl TraceInfo {
    /// Parse a trace body
    ///
    /// The body must contain `marker` somewhere and carry `colo` and `loc`
    /// keys whose values are uppercase ASCII letters. The first well-formed
    /// occurrence of each key wins.
    pub fn parse(body: &str, marker: &str) -> Result<Self, ProbeError> {
        if !body.contains(marker) {
            return Err(ProbeError::MissingMarker);
        }

        let mut colo = None;
        let mut loc = None;

        for line in body.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if !is_code(value) {
                continue;
            }

            match key.trim() {
                "colo" if colo.is_none() => colo = Some(value.to_string()),
                "loc" if loc.is_none() => loc = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(Self {
            colo: colo.ok_or(ProbeError::MissingField("colo"))?,
            loc: loc.ok_or(ProbeError::MissingField("loc"))?,
        })
    }
}

fn is_code(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_uppercase())
}
