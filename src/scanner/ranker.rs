//! Final ordering of scan results

use crate::models::{ProbeResult, SpeedTestResult};

/// Ordered result set handed to the report writer
#[derive(Debug, Clone, PartialEq)]
pub enum Ranking {
    /// Speed test disabled: collector receive order
    ///
    /// This order follows probe completion timing and differs between runs.
    /// It is not a latency ranking.
    Probed(Vec<ProbeResult>),

    /// Speed test ran: fastest first
    SpeedTested(Vec<SpeedTestResult>),
}

impl Ranking {
    /// Number of ranked entries
    pub fn len(&self) -> usize {
        match self {
            Self::Probed(results) => results.len(),
            Self::SpeedTested(results) => results.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether entries carry a download speed
    pub fn has_speed(&self) -> bool {
        matches!(self, Self::SpeedTested(_))
    }

    /// Probe results in ranked order
    pub fn probe_results(&self) -> Vec<&ProbeResult> {
        match self {
            Self::Probed(results) => results.iter().collect(),
            Self::SpeedTested(results) => results.iter().map(|r| &r.result).collect(),
        }
    }
}

/// Keep collector order
pub fn rank_probed(results: Vec<ProbeResult>) -> Ranking {
    Ranking::Probed(results)
}

/// Sort by download speed, descending
///
/// The sort is stable: equal speeds keep the order they were given in.
pub fn rank_by_speed(mut results: Vec<SpeedTestResult>) -> Ranking {
    results.sort_by(|a, b| b.download_speed_kbs.total_cmp(&a.download_speed_kbs));
    Ranking::SpeedTested(results)
}
