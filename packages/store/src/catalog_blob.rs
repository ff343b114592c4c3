//! Catalog snapshot ⇄ Parquet blob.
//!
//! The snapshot is one flat table; `last_ingestion_date` is a real
//! Parquet TIMESTAMP (naive UTC). Text is the exchange format at the
//! `DuckDB` boundary, with explicit CASTs on both sides so no implicit
//! inference is involved.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use statmirror_catalog_models::{CatalogSnapshot, DatasetDescriptor};

use crate::StoreError;

/// Text form of `last_ingestion_date` at the `DuckDB` boundary.
const TIMESTAMP_WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Accepts values with or without a fractional part when reading back.
const TIMESTAMP_READ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Writes a snapshot to a local Parquet file.
///
/// # Errors
///
/// Returns [`StoreError::Duckdb`] on staging or COPY failures.
pub fn write_snapshot(path: &Path, snapshot: &CatalogSnapshot) -> Result<(), StoreError> {
    let conn = duckdb::Connection::open_in_memory()?;

    conn.execute_batch(
        "CREATE TABLE catalog_stage (
            product_id BIGINT,
            title VARCHAR,
            subject VARCHAR,
            frequency VARCHAR,
            release_time VARCHAR,
            dimension_count INTEGER,
            row_count BIGINT,
            available BOOLEAN,
            last_ingestion_date VARCHAR
        );",
    )?;

    let mut stmt =
        conn.prepare("INSERT INTO catalog_stage VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)")?;
    for d in &snapshot.datasets {
        let stamp = d
            .last_ingestion_date
            .map(|t| t.naive_utc().format(TIMESTAMP_WRITE_FORMAT).to_string());
        stmt.execute(duckdb::params![
            d.product_id,
            d.title,
            d.subject,
            d.frequency,
            d.release_time,
            i64::from(d.dimension_count),
            d.row_count,
            d.available,
            stamp,
        ])?;
    }
    drop(stmt);

    conn.execute_batch(&format!(
        "COPY (
            SELECT product_id, title, subject, frequency, release_time,
                   dimension_count, row_count, available,
                   CAST(last_ingestion_date AS TIMESTAMP) AS last_ingestion_date
            FROM catalog_stage
        ) TO '{}' (FORMAT PARQUET)",
        path.to_string_lossy().replace('\'', "''")
    ))?;

    Ok(())
}

/// Reads a snapshot from a local Parquet file.
///
/// # Errors
///
/// Returns [`StoreError::Duckdb`] on read failures and
/// [`StoreError::Malformed`] when a timestamp cell doesn't parse.
pub fn read_snapshot(path: &Path) -> Result<CatalogSnapshot, StoreError> {
    let conn = duckdb::Connection::open_in_memory()?;

    let sql = format!(
        "SELECT product_id, title, subject, frequency, release_time,
                dimension_count, row_count, available,
                CAST(last_ingestion_date AS VARCHAR)
         FROM read_parquet('{}')",
        path.to_string_lossy().replace('\'', "''")
    );

    type RawRow = (
        i64,
        String,
        Option<String>,
        String,
        String,
        i64,
        i64,
        bool,
        Option<String>,
    );

    let mut stmt = conn.prepare(&sql)?;
    let raw: Vec<RawRow> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
            ))
        })?
        .collect::<Result<_, _>>()?;

    let mut datasets = Vec::with_capacity(raw.len());
    for (
        product_id,
        title,
        subject,
        frequency,
        release_time,
        dimension_count,
        row_count,
        available,
        stamp,
    ) in raw
    {
        datasets.push(DatasetDescriptor {
            product_id,
            title,
            subject,
            frequency,
            release_time,
            dimension_count: u32::try_from(dimension_count).unwrap_or(0),
            row_count,
            available,
            last_ingestion_date: stamp.as_deref().map(parse_timestamp).transpose()?,
        });
    }

    Ok(CatalogSnapshot::new(datasets))
}

/// Parses the text form of a stored timestamp back into UTC.
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_READ_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| StoreError::Malformed {
            message: format!("bad last_ingestion_date {value:?}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn dataset(product_id: i64, stamp: Option<DateTime<Utc>>) -> DatasetDescriptor {
        DatasetDescriptor {
            product_id,
            title: format!("Dataset {product_id}"),
            subject: (product_id % 2 == 0).then(|| "Economy".to_string()),
            frequency: "Monthly".to_string(),
            release_time: "2024-01-15T08:30".to_string(),
            dimension_count: 4,
            row_count: 9_000,
            available: product_id == 1,
            last_ingestion_date: stamp,
        }
    }

    #[test]
    fn snapshot_round_trips_through_parquet() {
        let tmp = std::env::temp_dir().join("statmirror_catalog_blob_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        let path = tmp.join("catalog.parquet");

        let stamp = Utc.with_ymd_and_hms(2024, 3, 1, 17, 45, 3).unwrap();
        let snapshot =
            CatalogSnapshot::new(vec![dataset(1, Some(stamp)), dataset(2, None)]);

        write_snapshot(&path, &snapshot).unwrap();
        let restored = read_snapshot(&path).unwrap();

        assert_eq!(restored, snapshot);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn empty_snapshot_round_trips() {
        let tmp = std::env::temp_dir().join("statmirror_catalog_blob_empty_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        let path = tmp.join("catalog.parquet");

        write_snapshot(&path, &CatalogSnapshot::default()).unwrap();
        assert!(read_snapshot(&path).unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parses_timestamps_with_and_without_fraction() {
        assert!(parse_timestamp("2024-03-01 17:45:03.123456").is_ok());
        assert!(parse_timestamp("2024-03-01 17:45:03").is_ok());
        assert!(parse_timestamp("not a timestamp").is_err());
    }
}
