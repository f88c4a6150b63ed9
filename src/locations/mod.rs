//! Datacenter location directory
//!
//! Maps datacenter codes (`colo`) to human-readable geography. The table is
//! a JSON array of entries such as:
//!
//! ```json
//! [{"iata":"NRT","lat":35.76,"lon":140.38,"cca2":"JP","region":"Asia Pacific",
//!   "city":"Tokyo","region_zh":"亚太","country":"Japan","city_zh":"东京","emoji":"🇯🇵"}]
//! ```
//!
//! It is loaded once from a local cache, or fetched from a remote source and
//! cached when the file does not exist yet. After loading it is read-only and
//! shared between workers without locking.

use std::collections::HashMap;
use std::path::Path;

use crate::models::LocationRecord;
use crate::utils::error::LocationError;

/// Read-only datacenter lookup table
#[derive(Debug, Clone, Default)]
pub struct LocationDirectory {
    by_code: HashMap<String, LocationRecord>,
    by_country: HashMap<String, LocationRecord>,
}

impl LocationDirectory {
    /// Build from parsed records; a later duplicate code replaces an earlier one
    pub fn from_records(records: impl IntoIterator<Item = LocationRecord>) -> Self {
        let mut by_code = HashMap::new();
        let mut by_country = HashMap::new();

        for record in records {
            if !record.cca2.is_empty() {
                by_country
                    .entry(record.cca2.clone())
                    .or_insert_with(|| record.clone());
            }
            by_code.insert(record.iata.clone(), record);
        }

        Self {
            by_code,
            by_country,
        }
    }

    /// Parse the JSON table format
    ///
    /// # Errors
    ///
    /// Returns `LocationError::Parse` if the JSON does not match the table shape
    pub fn from_json_str(json: &str) -> Result<Self, LocationError> {
        let records: Vec<LocationRecord> = serde_json::from_str(json)?;
        Ok(Self::from_records(records))
    }

    /// Load from `cache_path`, fetching from `source_url` and caching first if needed
    ///
    /// # Errors
    ///
    /// Any failure here is fatal for a scan: the cache cannot be read, the
    /// remote table cannot be fetched or written, or the JSON is invalid.
    pub async fn load_or_fetch(cache_path: &Path, source_url: &str) -> Result<Self, LocationError> {
        let cache_exists = tokio::fs::try_exists(cache_path)
            .await
            .map_err(|source| io_error(cache_path, source))?;

        let body = if cache_exists {
            tracing::debug!(path = %cache_path.display(), "Loading cached location table");
            tokio::fs::read_to_string(cache_path)
                .await
                .map_err(|source| io_error(cache_path, source))?
        } else {
            tracing::info!(
                path = %cache_path.display(),
                url = source_url,
                "Location table not cached, downloading"
            );
            let body = Self::fetch(source_url).await?;
            // Validate before caching so a bad download is not persisted
            Self::from_json_str(&body)?;
            tokio::fs::write(cache_path, &body)
                .await
                .map_err(|source| io_error(cache_path, source))?;
            body
        };

        let directory = Self::from_json_str(&body)?;
        tracing::info!(entries = directory.len(), "Location table loaded");
        Ok(directory)
    }

    async fn fetch(url: &str) -> Result<String, LocationError> {
        let fetch_error = |source| LocationError::Fetch {
            url: url.to_string(),
            source,
        };

        let response = reqwest::get(url).await.map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LocationError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(fetch_error)
    }

    /// Look up a datacenter code
    pub fn lookup(&self, colo: &str) -> Option<&LocationRecord> {
        self.by_code.get(colo)
    }

    /// First record for an ISO country code
    pub fn lookup_country(&self, cca2: &str) -> Option<&LocationRecord> {
        self.by_country.get(cca2)
    }

    /// Number of datacenter codes
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

fn io_error(path: &Path, source: std::io::Error) -> LocationError {
    LocationError::Io {
        path: path.display().to_string(),
        source,
    }
}
