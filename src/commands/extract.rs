use anyhow::{Context, Result};
use std::path::PathBuf;

use edgescan::config::Config;
use edgescan::locations::LocationDirectory;
use edgescan::report::{extract_file, ExtractOptions};
use edgescan::utils::with_extension;

#[derive(Debug, Clone, Default)]
pub struct ExtractParams {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub per_country: usize,
    pub min_speed: Option<f64>,
    pub locations: Option<PathBuf>,
}

/// Write a per-country address list from an existing report
pub async fn extract(config: Config, params: ExtractParams) -> Result<()> {
    let ExtractParams {
        input,
        output,
        per_country,
        min_speed,
        locations,
    } = params;

    if !input.exists() {
        anyhow::bail!("Report not found: {}", input.display());
    }

    let output = output.unwrap_or_else(|| with_extension(&input, "txt"));
    let cache_path = locations.unwrap_or(config.locations.cache_path);

    println!("Extracting Addresses by Country");
    println!("===============================");
    println!("  Input: {}", input.display());
    println!("  Output: {}", output.display());
    if per_country > 0 {
        println!("  Per country: {per_country}");
    }
    if let Some(min) = min_speed {
        println!("  Min speed: {min} kB/s");
    }

    let directory = LocationDirectory::load_or_fetch(&cache_path, &config.locations.source_url)
        .await
        .context("Failed to load location table")?;

    let options = ExtractOptions {
        per_country,
        min_speed,
    };
    let summary = extract_file(&input, &output, &directory, &options)
        .with_context(|| format!("Failed to extract from {}", input.display()))?;

    if summary.entries == 0 {
        println!("\nNo country met the requirements, nothing written");
        return Ok(());
    }

    println!(
        "\nExtracted {} entries from {} countries: {}",
        summary.entries,
        summary.countries.len(),
        summary.countries.join(", ")
    );
    println!("Written to {}", output.display());

    Ok(())
}
