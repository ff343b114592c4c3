//! HTTP client for the WDS-style REST API.
//!
//! Two endpoints matter: the full cube listing (catalog discovery) and the
//! per-dataset full-table download handle. Frequency codes are decoded to
//! labels here, at the wire boundary — nothing downstream sees the numeric
//! form.

use std::time::Duration;

use serde::Deserialize;
use statmirror_catalog::frequency::decode_frequency;
use statmirror_catalog_models::{CatalogSnapshot, DatasetDescriptor};

use crate::WdsError;

/// Production API root.
const DEFAULT_BASE_URL: &str = "https://www150.statcan.gc.ca/t1/wds/rest";

/// The upstream rejects default HTTP client agents.
const USER_AGENT: &str = "Mozilla/5.0";

/// Timeout for the catalog-listing and download-handle calls.
const API_TIMEOUT: Duration = Duration::from_secs(60);

/// One cube record from `getAllCubesList`, fields as the wire names them.
/// Everything is optional — the listing occasionally carries partial
/// records and one bad cube must not poison the whole catalog.
#[derive(Debug, Deserialize)]
struct WdsCube {
    #[serde(rename = "productId")]
    product_id: Option<i64>,
    #[serde(rename = "cubeTitleEn")]
    cube_title_en: Option<String>,
    #[serde(rename = "subjectEn")]
    subject_en: Option<String>,
    #[serde(rename = "frequencyCode")]
    frequency_code: Option<i64>,
    #[serde(rename = "releaseTime")]
    release_time: Option<String>,
    #[serde(default)]
    dimensions: Vec<serde_json::Value>,
    #[serde(rename = "nbDatapointsCube")]
    nb_datapoints: Option<i64>,
}

/// Response payload of `getFullTableDownloadCSV`.
#[derive(Debug, Deserialize)]
struct DownloadHandle {
    object: Option<String>,
}

/// Client for the remote catalog and archive-download APIs.
pub struct WdsClient {
    http: reqwest::Client,
    base_url: String,
}

impl WdsClient {
    /// Creates a client against the production API root.
    ///
    /// # Errors
    ///
    /// Returns [`WdsError::Http`] if the underlying HTTP client cannot be
    /// constructed.
    pub fn new() -> Result<Self, WdsError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a client against an alternate API root (used by tests and
    /// mirror deployments).
    ///
    /// # Errors
    ///
    /// Returns [`WdsError::Http`] if the underlying HTTP client cannot be
    /// constructed.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, WdsError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// The shared HTTP client, reused for archive transfers.
    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Fetches the full dataset listing and decodes it into descriptors.
    ///
    /// Cubes without a product ID are dropped with a warning; every other
    /// field is defaulted defensively. Fresh descriptors carry no
    /// ingestion date and `available = false` — both are reconciled
    /// against local state later.
    ///
    /// # Errors
    ///
    /// Returns [`WdsError::Http`] on transport or non-2xx failures.
    pub async fn list_all_datasets(&self) -> Result<CatalogSnapshot, WdsError> {
        let url = format!("{}/getAllCubesList", self.base_url);
        log::info!("Fetching catalog from {url}");

        let cubes: Vec<WdsCube> = self
            .http
            .get(&url)
            .timeout(API_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let total = cubes.len();
        let datasets: Vec<DatasetDescriptor> =
            cubes.into_iter().filter_map(descriptor_from_cube).collect();

        if datasets.len() < total {
            log::warn!(
                "Dropped {} catalog records without a product ID",
                total - datasets.len()
            );
        }
        log::info!("Catalog listing: {} datasets", datasets.len());

        Ok(CatalogSnapshot::new(datasets))
    }

    /// Resolves the archive download URL for one dataset.
    ///
    /// # Errors
    ///
    /// Returns [`WdsError::Http`] on transport or non-2xx failures, and
    /// [`WdsError::MalformedResponse`] when the payload carries no URL.
    pub async fn download_url(&self, product_id: i64) -> Result<String, WdsError> {
        let url = format!("{}/getFullTableDownloadCSV/{product_id}/en", self.base_url);

        let handle: DownloadHandle = self
            .http
            .get(&url)
            .timeout(API_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        handle.object.ok_or_else(|| WdsError::MalformedResponse {
            message: format!("download handle for {product_id} carries no object URL"),
        })
    }
}

/// Decodes one wire cube into a descriptor. `None` when the cube has no
/// product ID.
fn descriptor_from_cube(cube: WdsCube) -> Option<DatasetDescriptor> {
    let product_id = cube.product_id?;
    Some(DatasetDescriptor {
        product_id,
        title: cube.cube_title_en.unwrap_or_default(),
        subject: cube.subject_en,
        frequency: decode_frequency(cube.frequency_code.unwrap_or(-1)).to_string(),
        release_time: cube.release_time.unwrap_or_default(),
        dimension_count: u32::try_from(cube.dimensions.len()).unwrap_or(u32::MAX),
        row_count: cube.nb_datapoints.unwrap_or(0),
        available: false,
        last_ingestion_date: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_full_cube() {
        let cube: WdsCube = serde_json::from_value(serde_json::json!({
            "productId": 12_100_163,
            "cubeTitleEn": "International trade",
            "subjectEn": "Trade",
            "frequencyCode": 6,
            "releaseTime": "2024-01-15T08:30",
            "dimensions": [{}, {}, {}],
            "nbDatapointsCube": 42_000,
        }))
        .unwrap();

        let d = descriptor_from_cube(cube).unwrap();
        assert_eq!(d.product_id, 12_100_163);
        assert_eq!(d.title, "International trade");
        assert_eq!(d.frequency, "Monthly");
        assert_eq!(d.dimension_count, 3);
        assert_eq!(d.row_count, 42_000);
        assert!(!d.available);
        assert!(d.last_ingestion_date.is_none());
    }

    #[test]
    fn tolerates_partial_cubes() {
        let cube: WdsCube =
            serde_json::from_value(serde_json::json!({ "productId": 7 })).unwrap();

        let d = descriptor_from_cube(cube).unwrap();
        assert_eq!(d.title, "");
        assert_eq!(d.frequency, "Unknown");
        assert_eq!(d.dimension_count, 0);
    }

    #[test]
    fn drops_cubes_without_product_id() {
        let cube: WdsCube =
            serde_json::from_value(serde_json::json!({ "cubeTitleEn": "orphan" })).unwrap();
        assert!(descriptor_from_cube(cube).is_none());
    }
}
