#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Catalog, decision, and manifest types shared across the mirror pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one remote statistical table.
///
/// The `frequency` field always carries the decoded label (e.g. `"Monthly"`);
/// the numeric wire code never leaves the catalog-fetch boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Globally unique, stable dataset identifier. Primary key.
    pub product_id: i64,
    /// Human-readable title. May contain arbitrary Unicode.
    pub title: String,
    /// Subject/category label, when the source provides one.
    pub subject: Option<String>,
    /// Decoded update-frequency label (e.g. `"Monthly"`, `"Annual"`).
    pub frequency: String,
    /// ISO-8601-like release timestamp string, verbatim from the source.
    pub release_time: String,
    /// Number of classificatory axes on the table.
    pub dimension_count: u32,
    /// Approximate number of data points (volume signal).
    pub row_count: i64,
    /// Whether a matching folder existed in the object store at the last
    /// availability recomputation. Derived, never authoritative between
    /// recomputations.
    pub available: bool,
    /// When this dataset was last successfully materialized. `None` means
    /// never ingested and is treated the same as a brand-new dataset.
    pub last_ingestion_date: Option<DateTime<Utc>>,
}

/// A point-in-time collection of [`DatasetDescriptor`]s, persisted as a
/// single Parquet blob in the object store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Descriptors in catalog order. `product_id` is unique within a
    /// snapshot.
    pub datasets: Vec<DatasetDescriptor>,
}

impl CatalogSnapshot {
    /// Creates a snapshot from a list of descriptors.
    #[must_use]
    pub const fn new(datasets: Vec<DatasetDescriptor>) -> Self {
        Self { datasets }
    }

    /// Number of datasets in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// Whether the snapshot contains no datasets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Looks up a descriptor by product ID.
    #[must_use]
    pub fn get(&self, product_id: i64) -> Option<&DatasetDescriptor> {
        self.datasets.iter().find(|d| d.product_id == product_id)
    }
}

/// Why a dataset was selected for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Never successfully ingested (absent from the previous snapshot, or
    /// present without an ingestion date).
    New,
    /// Ingested before and the publication cadence interval has elapsed.
    UpdateDue,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::UpdateDue => write!(f, "update_due"),
        }
    }
}

/// Ephemeral record produced by the reconciler and consumed by the
/// selection filter and orchestrator. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingDecision {
    /// Dataset identifier.
    pub product_id: i64,
    /// Dataset title, carried for display.
    pub title: String,
    /// Decoded frequency label, carried for display.
    pub frequency: String,
    /// Why this dataset needs processing.
    pub reason: DecisionReason,
}

/// One successfully materialized dataset in the current run.
///
/// Serde field names match the persisted manifest's flat-table header
/// (`productId,title,size_mb,file_path`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Dataset identifier.
    #[serde(rename = "productId")]
    pub product_id: i64,
    /// Dataset title.
    pub title: String,
    /// Size of the materialized Parquet file in megabytes.
    pub size_mb: f64,
    /// Output path relative to the data root, e.g.
    /// `"12100163-international-trade/12100163.parquet"`.
    pub file_path: String,
}
