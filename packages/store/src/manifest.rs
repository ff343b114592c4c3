//! Run manifest ⇄ CSV flat table.
//!
//! Header is `productId,title,size_mb,file_path`. An empty manifest still
//! gets its header row, so "present with zero rows" stays distinguishable
//! from "missing".

use statmirror_catalog_models::ManifestEntry;

use crate::StoreError;

/// Column header, written explicitly for empty manifests.
const HEADER: [&str; 4] = ["productId", "title", "size_mb", "file_path"];

/// Serializes manifest entries to CSV bytes.
///
/// # Errors
///
/// Returns [`StoreError::Csv`] on serialization failures.
pub fn to_csv_bytes(entries: &[ManifestEntry]) -> Result<Vec<u8>, StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    if entries.is_empty() {
        writer.write_record(HEADER)?;
    }
    for entry in entries {
        writer.serialize(entry)?;
    }

    writer
        .into_inner()
        .map_err(|e| StoreError::Malformed {
            message: format!("manifest flush failed: {e}"),
        })
}

/// Deserializes manifest entries from CSV bytes. Zero-byte input reads as
/// an empty manifest.
///
/// # Errors
///
/// Returns [`StoreError::Csv`] on malformed rows.
pub fn from_csv_bytes(bytes: &[u8]) -> Result<Vec<ManifestEntry>, StoreError> {
    let mut reader = csv::Reader::from_reader(bytes);
    let entries = reader
        .deserialize()
        .collect::<Result<Vec<ManifestEntry>, _>>()?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(product_id: i64) -> ManifestEntry {
        ManifestEntry {
            product_id,
            title: format!("Dataset {product_id}"),
            size_mb: 12.5,
            file_path: format!("{product_id}-dataset-{product_id}/{product_id}.parquet"),
        }
    }

    #[test]
    fn manifest_round_trips() {
        let entries = vec![entry(1), entry(2)];
        let bytes = to_csv_bytes(&entries).unwrap();

        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("productId,title,size_mb,file_path\n"));

        assert_eq!(from_csv_bytes(&bytes).unwrap(), entries);
    }

    #[test]
    fn empty_manifest_keeps_its_header() {
        let bytes = to_csv_bytes(&[]).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert_eq!(text.trim_end(), "productId,title,size_mb,file_path");
        assert!(from_csv_bytes(&bytes).unwrap().is_empty());
    }

    #[test]
    fn zero_byte_input_reads_as_empty() {
        assert!(from_csv_bytes(b"").unwrap().is_empty());
    }
}
