//! Per-country address list extracted from a report
//!
//! Turns a report CSV into `ip:port#label<n>` lines grouped by the country of
//! the `源IP位置` code, e.g.
//!
//! ```text
//! 104.16.1.1:443#🇯🇵Japan1
//! 104.16.1.2:2053#🇯🇵Japan2
//! [2606:4700::1]:443#🇺🇸United States1
//! ```

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use super::SPEED_HEADER;
use crate::error::{Error, Result};
use crate::locations::LocationDirectory;
use crate::utils;

const IP_HEADER: &str = "IP地址";
const PORT_HEADER: &str = "端口";
const LOCATION_HEADER: &str = "源IP位置";

/// Label used when a location code is not in the directory
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Extraction settings
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Entries kept per country; 0 keeps all. When set, countries with
    /// fewer entries are dropped entirely.
    pub per_country: usize,

    /// Keep only rows faster than this many kB/s
    pub min_speed: Option<f64>,
}

/// Outcome of `extract_file`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Country labels written, sorted
    pub countries: Vec<String>,

    /// Lines written
    pub entries: usize,
}

/// Build the labelled lines from report CSV data
pub fn extract_by_country<R: Read>(
    reader: R,
    directory: &LocationDirectory,
    options: &ExtractOptions,
) -> Result<Vec<String>> {
    let grouped = group_by_country(reader, directory, options)?;
    Ok(render_groups(grouped))
}

/// Qualifying countries in label order, each with its unnumbered entries
fn group_by_country<R: Read>(
    reader: R,
    directory: &LocationDirectory,
    options: &ExtractOptions,
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let (Some(ip_idx), Some(port_idx), Some(loc_idx)) = (
        column(IP_HEADER),
        column(PORT_HEADER),
        column(LOCATION_HEADER),
    ) else {
        return Err(Error::other(format!(
            "Report is missing the {IP_HEADER}, {PORT_HEADER} or {LOCATION_HEADER} column"
        )));
    };
    let speed_idx = column(SPEED_HEADER);

    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for record in csv.records() {
        let record = record?;

        let (Some(ip), Some(port), Some(code)) =
            (record.get(ip_idx), record.get(port_idx), record.get(loc_idx))
        else {
            continue;
        };
        if ip.is_empty() {
            continue;
        }

        if let (Some(min), Some(speed)) = (options.min_speed, speed_idx.and_then(|i| record.get(i)))
        {
            if !passes_speed_filter(speed, min) {
                continue;
            }
        }

        let label = country_label(directory, code);
        let entries = grouped.entry(label.clone()).or_default();
        if options.per_country == 0 || entries.len() < options.per_country {
            entries.push(format!("{}:{}#{}", bracket_ipv6(ip), port, label));
        }
    }

    grouped.retain(|_, entries| options.per_country == 0 || entries.len() >= options.per_country);
    Ok(grouped)
}

fn render_groups(grouped: BTreeMap<String, Vec<String>>) -> Vec<String> {
    grouped
        .into_values()
        .flat_map(|entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(idx, entry)| format!("{}{}", entry, idx + 1))
        })
        .collect()
}

/// Extract from `input` and write the list to `output`
///
/// Nothing is written when no country qualifies.
pub fn extract_file(
    input: &Path,
    output: &Path,
    directory: &LocationDirectory,
    options: &ExtractOptions,
) -> Result<ExtractSummary> {
    let file = std::fs::File::open(input)?;
    let grouped = group_by_country(file, directory, options)?;
    let countries: Vec<String> = grouped.keys().cloned().collect();
    let lines = render_groups(grouped);

    if lines.is_empty() {
        tracing::warn!(input = %input.display(), "No country met the extraction criteria");
        return Ok(ExtractSummary {
            countries,
            entries: 0,
        });
    }

    utils::ensure_parent_dir(output)?;
    std::fs::write(output, lines.join("\n"))?;

    tracing::info!(
        output = %output.display(),
        entries = lines.len(),
        countries = countries.len(),
        "Extracted addresses by country"
    );

    Ok(ExtractSummary {
        countries,
        entries: lines.len(),
    })
}

fn country_label(directory: &LocationDirectory, code: &str) -> String {
    directory
        .lookup_country(code)
        .map(|record| format!("{}{}", record.emoji, record.country))
        .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string())
}

/// Rows with an unreadable speed are kept
fn passes_speed_filter(field: &str, min: f64) -> bool {
    match field.trim_end_matches("kB/s").trim().parse::<f64>() {
        Ok(speed) => speed > min,
        Err(_) => true,
    }
}

fn bracket_ipv6(ip: &str) -> String {
    if ip.contains(':') && !ip.starts_with('[') {
        format!("[{ip}]")
    } else {
        ip.to_string()
    }
}
