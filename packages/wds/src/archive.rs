//! ZIP validation and data-file selection.
//!
//! The download API answers errors as HTTP 200 with a JSON/HTML body, so
//! the archive's magic bytes are checked before any unpack attempt —
//! a signature mismatch is its own failure kind, not a generic unpack
//! error. Archives carry the data CSV alongside a `_MetaData.csv`
//! sidecar; selection prefers the data file but falls back to the sidecar
//! when it is all there is.

use std::io::Read as _;
use std::path::{Path, PathBuf};

use crate::WdsError;

/// ZIP local-file-header signature.
pub const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// Result of [`extract_data_file`].
#[derive(Debug)]
pub enum ExtractOutcome {
    /// Data file extracted to the destination directory.
    Extracted {
        /// Path of the extracted CSV.
        csv_path: PathBuf,
    },
    /// Uncompressed size exceeded the ceiling; nothing extracted.
    TooLarge {
        /// Uncompressed entry size, in MB.
        uncompressed_mb: u64,
    },
}

/// Checks that a downloaded file starts with the ZIP signature.
///
/// # Errors
///
/// Returns [`WdsError::NotAnArchive`] with the bytes actually found when
/// the signature doesn't match, [`WdsError::Io`] on read failures.
pub fn validate_signature(path: &Path) -> Result<(), WdsError> {
    let mut file = std::fs::File::open(path)?;
    let mut found = [0u8; 4];
    let n = file.read(&mut found)?;

    if n < ZIP_MAGIC.len() || found != ZIP_MAGIC {
        return Err(WdsError::NotAnArchive {
            found: found[..n].to_vec(),
        });
    }
    Ok(())
}

/// Whether an entry name matches the metadata-sidecar naming pattern.
#[must_use]
pub fn is_metadata_sidecar(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with("_metadata.csv")
}

/// Picks the data file from an archive's entry names.
///
/// Precedence: a single CSV candidate wins outright; with several, the
/// first non-sidecar wins; when every candidate is a sidecar, the first
/// one is used anyway (some tables ship only the sidecar).
///
/// # Errors
///
/// Returns [`WdsError::EmptyArchive`] for an archive with no entries and
/// [`WdsError::NoDataFile`] when no entry has the expected extension.
pub fn select_data_file(names: &[String]) -> Result<&str, WdsError> {
    if names.is_empty() {
        return Err(WdsError::EmptyArchive);
    }

    let csvs: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|n| n.to_ascii_lowercase().ends_with(".csv"))
        .collect();

    match csvs.as_slice() {
        [] => Err(WdsError::NoDataFile {
            names: names.to_vec(),
        }),
        [only] => Ok(*only),
        several => Ok(several
            .iter()
            .copied()
            .find(|n| !is_metadata_sidecar(n))
            .unwrap_or(several[0])),
    }
}

/// Selects and extracts the data file from a ZIP archive, enforcing the
/// uncompressed-size ceiling before any bytes are written.
///
/// # Errors
///
/// Returns [`WdsError::Zip`] on archive corruption, selection errors from
/// [`select_data_file`], and [`WdsError::Io`] on write failures.
pub fn extract_data_file(
    zip_path: &Path,
    dest_dir: &Path,
    max_uncompressed_mb: u64,
) -> Result<ExtractOutcome, WdsError> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let names: Vec<String> = archive.file_names().map(String::from).collect();
    let selected = select_data_file(&names)?.to_string();

    let mut entry = archive.by_name(&selected)?;
    let uncompressed = entry.size();
    if crate::exceeds_mb(uncompressed, max_uncompressed_mb) {
        return Ok(ExtractOutcome::TooLarge {
            uncompressed_mb: uncompressed / 1_000_000,
        });
    }

    // Flatten any directory component in the entry name.
    let file_name = Path::new(&selected)
        .file_name()
        .map_or_else(|| selected.clone().into(), PathBuf::from);
    let csv_path = dest_dir.join(file_name);

    let mut out = std::fs::File::create(&csv_path)?;
    std::io::copy(&mut entry, &mut out)?;

    Ok(ExtractOutcome::Extracted { csv_path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn empty_archive_is_an_error() {
        assert!(matches!(
            select_data_file(&[]),
            Err(WdsError::EmptyArchive)
        ));
    }

    #[test]
    fn no_csv_is_an_error() {
        let err = select_data_file(&names(&["readme.txt", "notes.pdf"])).unwrap_err();
        assert!(matches!(err, WdsError::NoDataFile { .. }));
    }

    #[test]
    fn single_csv_wins_even_as_sidecar() {
        let list = names(&["12100163_MetaData.csv"]);
        assert_eq!(select_data_file(&list).unwrap(), "12100163_MetaData.csv");
    }

    #[test]
    fn prefers_data_file_over_sidecar() {
        let list = names(&["12100163_MetaData.csv", "12100163.csv"]);
        assert_eq!(select_data_file(&list).unwrap(), "12100163.csv");
    }

    #[test]
    fn all_sidecars_falls_back_to_first() {
        let list = names(&["a_MetaData.csv", "b_MetaData.csv"]);
        assert_eq!(select_data_file(&list).unwrap(), "a_MetaData.csv");
    }

    #[test]
    fn non_csv_entries_are_ignored_during_selection() {
        let list = names(&["readme.txt", "12100163.csv", "12100163_MetaData.csv"]);
        assert_eq!(select_data_file(&list).unwrap(), "12100163.csv");
    }

    #[test]
    fn rejects_non_zip_payload() {
        let tmp = std::env::temp_dir().join("statmirror_sig_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let path = tmp.join("fake.zip");
        std::fs::write(&path, b"{\"status\": \"FAILED\"}").unwrap();

        let err = validate_signature(&path).unwrap_err();
        assert!(matches!(err, WdsError::NotAnArchive { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn extracts_the_data_file() {
        let tmp = std::env::temp_dir().join("statmirror_extract_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let zip_path = tmp.join("table.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        writer.start_file("12100163_MetaData.csv", options).unwrap();
        writer.write_all(b"field,value\n").unwrap();
        writer.start_file("12100163.csv", options).unwrap();
        writer.write_all(b"REF_DATE,VALUE\n2024,42\n").unwrap();
        writer.finish().unwrap();

        validate_signature(&zip_path).unwrap();
        let outcome = extract_data_file(&zip_path, &tmp, 200).unwrap();
        let ExtractOutcome::Extracted { csv_path } = outcome else {
            panic!("expected extraction");
        };
        assert_eq!(csv_path.file_name().unwrap(), "12100163.csv");
        let body = std::fs::read_to_string(&csv_path).unwrap();
        assert!(body.starts_with("REF_DATE"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn oversize_entry_is_reported_not_extracted() {
        let tmp = std::env::temp_dir().join("statmirror_oversize_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let zip_path = tmp.join("table.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        writer.start_file("big.csv", options).unwrap();
        writer.write_all(b"REF_DATE,VALUE\n2024,42\n").unwrap();
        writer.finish().unwrap();

        // Ceiling of zero MB: any non-empty entry is too large.
        let outcome = extract_data_file(&zip_path, &tmp, 0).unwrap();
        assert!(matches!(outcome, ExtractOutcome::TooLarge { .. }));
        assert!(!tmp.join("big.csv").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
