#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Object-store persistence sync.
//!
//! The store is a plain key-value blob surface keyed by path. Layout per
//! source:
//!
//! | key | contents |
//! |---|---|
//! | `{source}/data/{folder_key}/{product_id}.parquet` | dataset payloads |
//! | `{source}/catalog/catalog.parquet` | catalog snapshot |
//! | `{source}/catalog/manifest.csv` | last run's ingestion manifest |
//!
//! The child-prefix listing under `{source}/data/` is the **ground truth**
//! for what is actually mirrored — an `available` flag carried inside a
//! snapshot is never trusted, because an aborted run can leave partial
//! state.
//!
//! # Environment Variables
//!
//! | Variable | Required | Description |
//! |---|---|---|
//! | `STATMIRROR_BUCKET` | Yes | Bucket holding the mirror |
//! | `STATMIRROR_SOURCE` | No | Source prefix (default `statscan`) |
//! | `AWS_ACCESS_KEY_ID` | Yes | S3-compatible access key |
//! | `AWS_SECRET_ACCESS_KEY` | Yes | S3-compatible secret key |
//! | `AWS_REGION` | No | Region (default `us-east-2`) |
//! | `AWS_ENDPOINT_URL` | No | Endpoint override for S3-compatible stores |

mod catalog_blob;
mod manifest;

use std::collections::BTreeSet;
use std::path::Path;

use aws_config::Region;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use aws_sdk_s3::operation::get_object::GetObjectError;
use statmirror_catalog::naming::extract_product_id;
use statmirror_catalog_models::{CatalogSnapshot, ManifestEntry};

/// Errors that can occur during object-store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: String,
    },

    /// `GetObject` failed.
    #[error("Failed to download s3://{bucket}/{key}: {source}")]
    Download {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `PutObject` failed.
    #[error("Failed to upload s3://{bucket}/{key}: {source}")]
    Upload {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `ListObjectsV2` failed.
    #[error("Failed to list s3://{bucket}/{prefix}: {source}")]
    List {
        /// Bucket name.
        bucket: String,
        /// Key prefix.
        prefix: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O error reading or writing local files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog blob staging or read failed.
    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),

    /// Manifest CSV parse/serialize failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A persisted blob didn't have the expected shape.
    #[error("Malformed blob: {message}")]
    Malformed {
        /// What was wrong with the blob.
        message: String,
    },
}

/// Client for syncing catalog state and payloads with the object store.
pub struct StoreClient {
    client: aws_sdk_s3::Client,
    bucket: String,
    source: String,
}

impl StoreClient {
    /// Creates a client from environment variables (see crate docs).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingEnv`] if a required variable is unset.
    pub fn from_env() -> Result<Self, StoreError> {
        let bucket = require_env("STATMIRROR_BUCKET")?;
        let source =
            std::env::var("STATMIRROR_SOURCE").unwrap_or_else(|_| "statscan".to_string());
        let access_key = require_env("AWS_ACCESS_KEY_ID")?;
        let secret_key = require_env("AWS_SECRET_ACCESS_KEY")?;
        let region = std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-2".to_string());

        let creds = Credentials::new(&access_key, &secret_key, None, None, "statmirror-env");
        let mut config = aws_sdk_s3::Config::builder()
            .region(Region::new(region))
            .credentials_provider(creds)
            .force_path_style(true)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled());

        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
            config = config.endpoint_url(endpoint);
        }

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(config.build()),
            bucket,
            source,
        })
    }

    /// The source prefix this client mirrors (e.g. `"statscan"`).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The bucket holding the mirror.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Key prefix holding dataset payload folders.
    #[must_use]
    pub fn data_prefix(&self) -> String {
        format!("{}/data/", self.source)
    }

    /// Key of the persisted catalog snapshot.
    #[must_use]
    pub fn catalog_key(&self) -> String {
        format!("{}/catalog/catalog.parquet", self.source)
    }

    /// Key of the persisted run manifest.
    #[must_use]
    pub fn manifest_key(&self) -> String {
        format!("{}/catalog/manifest.csv", self.source)
    }

    // ── Ground-truth listing ────────────────────────────────────────

    /// Lists dataset folder names actually present under the data prefix,
    /// verbatim — including any non-dataset prefixes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::List`] on listing failures.
    pub async fn existing_dataset_folders(&self) -> Result<Vec<String>, StoreError> {
        let prefix = self.data_prefix();
        let children = self.list_child_prefixes(&prefix).await?;
        Ok(children
            .iter()
            .filter_map(|child| folder_from_prefix(child, &prefix))
            .collect())
    }

    /// Product IDs actually present in the store. Folders that don't parse
    /// as a folder key are silently excluded — they're not errors, just
    /// not datasets. This listing is the sole source of truth for "what do
    /// we already have".
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::List`] on listing failures.
    pub async fn existing_dataset_ids(&self) -> Result<BTreeSet<i64>, StoreError> {
        let folders = self.existing_dataset_folders().await?;
        Ok(folders
            .iter()
            .filter_map(|f| extract_product_id(f))
            .collect())
    }

    /// Lists immediate child prefixes of a key prefix (one listing page at
    /// a time, delimiter `/`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::List`] on listing failures.
    pub async fn list_child_prefixes(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut children = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .delimiter("/");

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|e| StoreError::List {
                bucket: self.bucket.clone(),
                prefix: prefix.to_string(),
                source: Box::new(e),
            })?;

            for common in output.common_prefixes() {
                if let Some(child) = common.prefix() {
                    children.push(child.to_string());
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        Ok(children)
    }

    // ── Catalog snapshot ────────────────────────────────────────────

    /// Downloads the persisted catalog snapshot.
    ///
    /// Any failure — missing blob, network error, unreadable Parquet —
    /// reads as an empty snapshot. This is first-run tolerance: the one
    /// place a collaborator failure is deliberately downgraded to a normal
    /// empty state instead of propagated.
    pub async fn read_catalog(&self) -> CatalogSnapshot {
        match self.try_read_catalog().await {
            Ok(snapshot) => {
                log::info!("Downloaded catalog snapshot: {} datasets", snapshot.len());
                snapshot
            }
            Err(e) => {
                log::warn!("No usable catalog in store (first run?): {e}");
                CatalogSnapshot::default()
            }
        }
    }

    /// Fallible catalog read, used by [`Self::read_catalog`].
    async fn try_read_catalog(&self) -> Result<CatalogSnapshot, StoreError> {
        let key = self.catalog_key();
        let bytes = self
            .get_object_bytes(&key)
            .await?
            .ok_or_else(|| StoreError::Malformed {
                message: format!("no catalog at {key}"),
            })?;

        let dir = tempfile::Builder::new().prefix("statmirror-store-").tempdir()?;
        let path = dir.path().join("catalog.parquet");
        tokio::fs::write(&path, bytes).await?;
        catalog_blob::read_snapshot(&path)
    }

    /// Persists the catalog snapshot, unconditionally overwriting the
    /// previous blob. Last writer wins; there is no versioning or locking.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on staging or upload failures.
    pub async fn write_catalog(&self, snapshot: &CatalogSnapshot) -> Result<(), StoreError> {
        let dir = tempfile::Builder::new().prefix("statmirror-store-").tempdir()?;
        let path = dir.path().join("catalog.parquet");
        catalog_blob::write_snapshot(&path, snapshot)?;

        let bytes = tokio::fs::read(&path).await?;
        let key = self.catalog_key();
        self.put_object_bytes(&key, bytes, "application/octet-stream")
            .await?;
        log::info!(
            "Uploaded catalog snapshot ({} datasets) to s3://{}/{key}",
            snapshot.len(),
            self.bucket
        );
        Ok(())
    }

    // ── Run manifest ────────────────────────────────────────────────

    /// Downloads the last run's manifest. A missing manifest reads as
    /// zero ingestions; a present-but-empty one does too — both are
    /// valid, non-error states.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on download failures other than a missing
    /// blob, or on malformed rows.
    pub async fn read_manifest(&self) -> Result<Vec<ManifestEntry>, StoreError> {
        let key = self.manifest_key();
        match self.get_object_bytes(&key).await? {
            None => Ok(Vec::new()),
            Some(bytes) => manifest::from_csv_bytes(&bytes),
        }
    }

    /// Persists the run manifest, header included even when it is empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on serialization or upload failures.
    pub async fn write_manifest(&self, entries: &[ManifestEntry]) -> Result<(), StoreError> {
        let bytes = manifest::to_csv_bytes(entries)?;
        let key = self.manifest_key();
        self.put_object_bytes(&key, bytes, "text/csv").await?;
        log::info!(
            "Uploaded manifest ({} entries) to s3://{}/{key}",
            entries.len(),
            self.bucket
        );
        Ok(())
    }

    // ── Dataset payloads ────────────────────────────────────────────

    /// Uploads every manifest entry's Parquet file from the local data
    /// directory. Entries whose local file is missing are skipped with a
    /// warning. Returns the number of files uploaded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Upload`] on upload failures, [`StoreError::Io`]
    /// on local read failures.
    pub async fn upload_ingested(
        &self,
        entries: &[ManifestEntry],
        data_dir: &Path,
    ) -> Result<usize, StoreError> {
        let mut uploaded = 0;

        for entry in entries {
            let local = data_dir.join(&entry.file_path);
            if !local.exists() {
                log::warn!("{} not found locally, skipping upload", local.display());
                continue;
            }

            let key = format!("{}{}", self.data_prefix(), entry.file_path);
            let bytes = tokio::fs::read(&local).await?;
            self.put_object_bytes(&key, bytes, "application/octet-stream")
                .await?;
            log::info!("Uploaded {} -> s3://{}/{key}", local.display(), self.bucket);
            uploaded += 1;
        }

        Ok(uploaded)
    }

    // ── Low-level operations ────────────────────────────────────────

    /// Fetches an object's bytes. `None` when the key doesn't exist.
    async fn get_object_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(GetObjectError::is_no_such_key)
                {
                    return Ok(None);
                }
                return Err(StoreError::Download {
                    bucket: self.bucket.clone(),
                    key: key.to_string(),
                    source: Box::new(err),
                });
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Download {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source: Box::new(e),
            })?;

        Ok(Some(bytes.into_bytes().to_vec()))
    }

    /// Uploads bytes to a key, overwriting any existing object.
    async fn put_object_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(aws_sdk_s3::primitives::ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::Upload {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source: Box::new(e),
            })?;

        Ok(())
    }
}

/// Extracts the folder name from a child-prefix listing entry, e.g.
/// `"statscan/data/12100163-trade/"` under `"statscan/data/"` is
/// `"12100163-trade"`.
fn folder_from_prefix(child: &str, parent: &str) -> Option<String> {
    let rest = child.strip_prefix(parent)?;
    let folder = rest.trim_end_matches('/');
    (!folder.is_empty()).then(|| folder.to_string())
}

/// Reads a required environment variable.
fn require_env(name: &str) -> Result<String, StoreError> {
    std::env::var(name).map_err(|_| StoreError::MissingEnv {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_parent_and_trailing_slash() {
        assert_eq!(
            folder_from_prefix("statscan/data/12100163-trade/", "statscan/data/"),
            Some("12100163-trade".to_string())
        );
        assert_eq!(
            folder_from_prefix("statscan/data/catalog/", "statscan/data/"),
            Some("catalog".to_string())
        );
    }

    #[test]
    fn rejects_foreign_and_empty_prefixes() {
        assert_eq!(folder_from_prefix("other/data/x/", "statscan/data/"), None);
        assert_eq!(folder_from_prefix("statscan/data/", "statscan/data/"), None);
    }
}
