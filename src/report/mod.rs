//! CSV report output
//!
//! One row per ranked result, in ranking order. The column set depends on
//! whether the speed-test stage ran:
//!
//! ```text
//! IP地址,端口,TLS,数据中心,源IP位置,地区,城市,地区(中文),国家,城市(中文),国旗,网络延迟[,下载速度]
//! ```

pub mod extract;

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::models::ProbeResult;
use crate::scanner::Ranking;
use crate::utils;

pub use extract::{extract_by_country, extract_file, ExtractOptions, ExtractSummary};

/// Header columns shared by both report shapes
pub const BASE_HEADERS: [&str; 12] = [
    "IP地址",
    "端口",
    "TLS",
    "数据中心",
    "源IP位置",
    "地区",
    "城市",
    "地区(中文)",
    "国家",
    "城市(中文)",
    "国旗",
    "网络延迟",
];

/// Extra column present when download speeds were measured
pub const SPEED_HEADER: &str = "下载速度";

/// Write the report to `path`, creating parent directories as needed
pub fn write_report(path: &Path, ranking: &Ranking, tls: bool) -> Result<()> {
    utils::ensure_parent_dir(path)?;

    let file = File::create(path)?;
    write_report_to(file, ranking, tls)?;

    tracing::info!(path = %path.display(), rows = ranking.len(), "Report written");
    Ok(())
}

/// Write the report to any writer
pub fn write_report_to<W: Write>(writer: W, ranking: &Ranking, tls: bool) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);

    if ranking.has_speed() {
        let mut header = BASE_HEADERS.to_vec();
        header.push(SPEED_HEADER);
        csv.write_record(&header)?;
    } else {
        csv.write_record(BASE_HEADERS)?;
    }

    match ranking {
        Ranking::Probed(results) => {
            for result in results {
                csv.write_record(base_row(result, tls))?;
            }
        }
        Ranking::SpeedTested(results) => {
            for tested in results {
                let mut row = base_row(&tested.result, tls);
                row.push(format!("{:.0} kB/s", tested.download_speed_kbs));
                csv.write_record(row)?;
            }
        }
    }

    csv.flush()?;
    Ok(())
}

fn base_row(result: &ProbeResult, tls: bool) -> Vec<String> {
    vec![
        result.candidate.address.clone(),
        result.candidate.port.to_string(),
        tls.to_string(),
        result.datacenter.clone(),
        result.source_location.clone(),
        result.geo.region.clone(),
        result.geo.city.clone(),
        result.geo.region_zh.clone(),
        result.geo.country.clone(),
        result.geo.city_zh.clone(),
        result.geo.emoji.clone(),
        result.latency.clone(),
    ]
}
