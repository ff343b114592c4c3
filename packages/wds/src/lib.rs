#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Client for the WDS-style open-data APIs and the archive fetch pipeline.
//!
//! Covers the two external read-only surfaces (catalog listing and
//! download-handle lookup) plus everything between "we have a download
//! URL" and "there is a validated CSV on local disk": size probing,
//! streamed transfer with decile progress, ZIP signature validation, and
//! data-file selection/extraction. Remote resources are of unknown and
//! sometimes hostile size/shape, so both transfer and extraction are
//! bounded by configurable ceilings — exceeding one is a skip, not an
//! error.

pub mod archive;
pub mod client;
pub mod download;

use std::path::PathBuf;

use tempfile::TempDir;

pub use client::WdsClient;

/// Size ceilings applied before and after transfer.
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    /// Skip archives whose declared content length exceeds this many MB.
    /// Heuristic pre-transfer check to save bandwidth.
    pub max_download_mb: u64,
    /// Skip data files whose uncompressed size exceeds this many MB.
    /// Accurate post-transfer check against the archive's entry table.
    pub max_uncompressed_mb: u64,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_download_mb: 100,
            max_uncompressed_mb: 200,
        }
    }
}

/// Why a dataset was skipped rather than fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Declared archive size exceeded the pre-transfer ceiling.
    ArchiveTooLarge {
        /// Declared content length, in MB.
        declared_mb: u64,
    },
    /// Uncompressed data file exceeded the post-transfer ceiling.
    DataTooLarge {
        /// Uncompressed entry size, in MB.
        uncompressed_mb: u64,
    },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ArchiveTooLarge { declared_mb } => {
                write!(f, "archive too large ({declared_mb}MB declared)")
            }
            Self::DataTooLarge { uncompressed_mb } => {
                write!(f, "CSV too large ({uncompressed_mb}MB uncompressed)")
            }
        }
    }
}

/// An extracted data file, alive as long as this value is.
///
/// The backing temp directory is removed on drop, so the caller must hold
/// this across the conversion step.
#[derive(Debug)]
pub struct FetchedCsv {
    /// Path to the extracted CSV inside the temp workdir.
    pub csv_path: PathBuf,
    /// Owns the extraction directory; dropped on every exit path.
    _workdir: TempDir,
}

/// Result of [`fetch_and_extract`].
#[derive(Debug)]
pub enum FetchOutcome {
    /// Archive downloaded, validated, and the data file extracted.
    Fetched(FetchedCsv),
    /// Dataset skipped by a size ceiling. Not an error.
    Skipped(SkipReason),
}

/// Errors from the WDS client and archive pipeline.
#[derive(Debug, thiserror::Error)]
pub enum WdsError {
    /// HTTP request failed (transport or non-2xx status).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered 2xx but the payload wasn't the expected shape.
    #[error("Malformed API response: {message}")]
    MalformedResponse {
        /// What was wrong with the payload.
        message: String,
    },

    /// Downloaded file doesn't start with the ZIP signature. The remote
    /// API returned an error payload disguised as a success response.
    #[error("Downloaded file is not a ZIP archive (signature {found:02x?})")]
    NotAnArchive {
        /// Leading bytes actually found.
        found: Vec<u8>,
    },

    /// The archive contains no entries at all.
    #[error("ZIP archive is empty")]
    EmptyArchive,

    /// The archive has entries but none with the expected extension.
    #[error("No CSV data file found in ZIP. Files: {names:?}")]
    NoDataFile {
        /// Entry names present in the archive.
        names: Vec<String>,
    },

    /// Archive could not be opened or an entry could not be read.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Local filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WdsError {
    /// Short stable name for the error kind, used when log lines must
    /// stay scannable.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "HttpError",
            Self::MalformedResponse { .. } => "MalformedResponse",
            Self::NotAnArchive { .. } => "NotAnArchive",
            Self::EmptyArchive => "EmptyArchive",
            Self::NoDataFile { .. } => "NoDataFile",
            Self::Zip(_) => "ZipError",
            Self::Io(_) => "IoError",
        }
    }
}

/// Fetches one dataset's archive and extracts its data file.
///
/// Full pipeline for a single dataset: resolve the download URL, probe the
/// declared size, stream the archive to a temp file with decile progress
/// logging, validate the ZIP signature, pick the data file (preferring
/// non-sidecar entries), check the uncompressed ceiling, and extract.
/// `label` is the display prefix for log lines.
///
/// Every temp artifact (downloaded archive, extraction dir) is removed on
/// every exit path; the extraction dir survives exactly as long as the
/// returned [`FetchedCsv`].
///
/// # Errors
///
/// Returns [`WdsError`] on network failures, malformed API responses, or
/// invalid archives. Size-ceiling hits are reported as
/// [`FetchOutcome::Skipped`], not errors.
pub async fn fetch_and_extract(
    client: &WdsClient,
    limits: FetchLimits,
    product_id: i64,
    label: &str,
) -> Result<FetchOutcome, WdsError> {
    let url = client.download_url(product_id).await?;

    let declared = download::probe_content_length(client.http(), &url).await?;
    if exceeds_mb(declared, limits.max_download_mb) {
        return Ok(FetchOutcome::Skipped(SkipReason::ArchiveTooLarge {
            declared_mb: declared / 1_000_000,
        }));
    }

    let mut archive_file = tempfile::Builder::new()
        .prefix("statmirror-")
        .suffix(".zip")
        .tempfile()?;
    download::stream_to_file(client.http(), &url, archive_file.as_file_mut(), declared, label)
        .await?;

    log::info!("{label} - Downloaded, extracting...");
    archive::validate_signature(archive_file.path())?;

    let workdir = tempfile::Builder::new().prefix("statmirror-").tempdir()?;
    match archive::extract_data_file(
        archive_file.path(),
        workdir.path(),
        limits.max_uncompressed_mb,
    )? {
        archive::ExtractOutcome::TooLarge { uncompressed_mb } => Ok(FetchOutcome::Skipped(
            SkipReason::DataTooLarge { uncompressed_mb },
        )),
        archive::ExtractOutcome::Extracted { csv_path } => Ok(FetchOutcome::Fetched(FetchedCsv {
            csv_path,
            _workdir: workdir,
        })),
    }
}

/// Whether a byte count is over a megabyte ceiling.
pub(crate) const fn exceeds_mb(bytes: u64, max_mb: u64) -> bool {
    bytes > max_mb.saturating_mul(1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_boundary_is_inclusive() {
        assert!(!exceeds_mb(100_000_000, 100));
        assert!(exceeds_mb(100_000_001, 100));
        assert!(!exceeds_mb(0, 0));
        assert!(exceeds_mb(1, 0));
    }

    #[test]
    fn skip_reasons_render_for_log_lines() {
        assert_eq!(
            SkipReason::ArchiveTooLarge { declared_mb: 512 }.to_string(),
            "archive too large (512MB declared)"
        );
        assert_eq!(
            SkipReason::DataTooLarge {
                uncompressed_mb: 300
            }
            .to_string(),
            "CSV too large (300MB uncompressed)"
        );
    }
}
