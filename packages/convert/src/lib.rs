#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Streaming CSV→Parquet conversion.
//!
//! Source tables mix numbers, categories, and footnote codes in the same
//! column, so every field is written as text — no type inference, no
//! silent coercion; typing happens at query time. A fixed set of
//! domain sentinel tokens (suppression markers, quality grades, "not
//! available" dots, ...) is substituted with true nulls instead of being
//! kept as literal strings.
//!
//! Input files run to hundreds of megabytes with 50+ columns, so rows are
//! streamed in bounded batches through a `DuckDB` staging table (opened
//! with a memory limit) and finished with a `COPY ... (FORMAT PARQUET)`.
//! For long unattended batch runs the whole conversion is executed in a
//! worker child process — see [`worker`] — so teardown reclaims all
//! memory no matter what the conversion internals leaked.

pub mod worker;

use std::path::Path;

use statmirror_catalog::naming::sanitize_column_names;

/// Table symbols the source uses for "not available", "suppressed",
/// "unreliable", etc. Each becomes a true null during conversion. The set
/// is exact: `"N/A"`, `"42"`, and any other literal survive as text.
pub const NULL_SENTINELS: [&str; 19] = [
    "", ".", "..", "...", "x", "X", "E", "e", "F", "f", "t", "T", "A", "B", "C", "D", "p", "r",
    "0s",
];

/// Rows are flushed to the staging table once a batch reaches this many
/// bound parameters (rows × columns).
const INSERT_PARAM_BUDGET: usize = 20_000;

/// Errors from conversion and worker execution.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// CSV reading failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Staging table or Parquet write failed.
    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),

    /// Local filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input file isn't a usable CSV (e.g. empty header).
    #[error("Malformed input: {message}")]
    Malformed {
        /// What was wrong with the input.
        message: String,
    },

    /// The isolated worker exceeded its wall-clock budget and was killed.
    #[error("Conversion timeout (>{limit_secs}s)")]
    Timeout {
        /// The budget that was exceeded, in seconds.
        limit_secs: u64,
    },

    /// The isolated worker exited unsuccessfully.
    #[error("Conversion worker failed (exit code {code:?})")]
    WorkerFailed {
        /// The worker's exit code, when one was available.
        code: Option<i32>,
    },
}

impl ConvertError {
    /// Short stable name for the error kind, used when log lines must
    /// stay scannable.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Csv(_) => "CsvError",
            Self::Duckdb(_) => "DuckdbError",
            Self::Io(_) => "IoError",
            Self::Malformed { .. } => "MalformedInput",
            Self::Timeout { .. } => "ConversionTimeout",
            Self::WorkerFailed { .. } => "ConversionFailed",
        }
    }
}

/// Whether a raw field is one of the domain's null sentinels.
#[must_use]
pub fn is_null_sentinel(value: &str) -> bool {
    NULL_SENTINELS.contains(&value)
}

/// Substitutes sentinel tokens with null; everything else passes through
/// verbatim.
#[must_use]
pub fn normalize_field(value: &str) -> Option<&str> {
    if is_null_sentinel(value) { None } else { Some(value) }
}

/// Reads just the header row of a CSV — the lightweight pre-scan that the
/// orchestrator and the conversion share, so sanitized names can never
/// drift between the two.
///
/// # Errors
///
/// Returns [`ConvertError::Csv`] on unreadable input and
/// [`ConvertError::Malformed`] when no header is present.
pub fn prescan_header(input: &Path) -> Result<Vec<String>, ConvertError> {
    let mut reader = csv::ReaderBuilder::new().from_path(input)?;
    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();

    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(ConvertError::Malformed {
            message: format!("{} has no header row", input.display()),
        });
    }
    Ok(headers)
}

/// Converts a delimited text file to Parquet, all columns typed as text.
///
/// Runs synchronously and unbounded in time — callers that need the
/// memory-isolation and timeout guarantees go through
/// [`worker::run_isolated`] instead of calling this directly.
///
/// # Errors
///
/// Returns [`ConvertError`] on malformed input or any read/stage/write
/// failure.
pub fn convert_file(input: &Path, output: &Path) -> Result<(), ConvertError> {
    let raw_header = prescan_header(input)?;
    let columns = sanitize_column_names(&raw_header);
    let column_count = columns.len();

    // Staging database lives in its own temp dir, removed on every exit.
    let staging_dir = tempfile::Builder::new().prefix("statmirror-convert-").tempdir()?;
    let conn = open_staging(&staging_dir.path().join("staging.duckdb"))?;

    let ddl = format!(
        "CREATE TABLE staged ({})",
        columns
            .iter()
            .map(|c| format!("{} VARCHAR", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ")
    );
    conn.execute_batch(&ddl)?;

    let rows_per_chunk = (INSERT_PARAM_BUDGET / column_count).max(1);
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(input)?;
    let mut batch: Vec<Vec<Option<String>>> = Vec::with_capacity(rows_per_chunk);
    let mut total_rows: u64 = 0;

    for record in reader.records() {
        let record = record?;
        batch.push(row_from_record(&record, column_count));

        if batch.len() >= rows_per_chunk {
            flush_batch(&conn, column_count, &batch)?;
            total_rows += batch.len() as u64;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        flush_batch(&conn, column_count, &batch)?;
        total_rows += batch.len() as u64;
    }

    conn.execute_batch(&format!(
        "COPY staged TO '{}' (FORMAT PARQUET)",
        quote_literal(&output.to_string_lossy())
    ))?;

    log::info!(
        "Converted {} rows x {column_count} columns to {}",
        total_rows,
        output.display()
    );
    Ok(())
}

/// Opens the staging database with the same resource settings the rest of
/// the pipeline uses for `DuckDB` connections.
fn open_staging(path: &Path) -> Result<duckdb::Connection, ConvertError> {
    let conn = duckdb::Connection::open(path)?;
    conn.execute_batch(
        "SET threads = 4;
         SET memory_limit = '512MB';",
    )?;
    Ok(conn)
}

/// Normalizes one CSV record into a fixed-width row: sentinels become
/// nulls, short rows are padded with nulls, long rows are truncated to the
/// header width.
fn row_from_record(record: &csv::StringRecord, column_count: usize) -> Vec<Option<String>> {
    let mut row: Vec<Option<String>> = record
        .iter()
        .take(column_count)
        .map(|field| normalize_field(field).map(String::from))
        .collect();
    row.resize(column_count, None);
    row
}

/// Multi-row INSERT of one batch into the staging table.
fn flush_batch(
    conn: &duckdb::Connection,
    column_count: usize,
    batch: &[Vec<Option<String>>],
) -> Result<(), ConvertError> {
    let placeholders = format!("({})", vec!["?"; column_count].join(", "));

    let mut sql = String::from("INSERT INTO staged VALUES ");
    for i in 0..batch.len() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&placeholders);
    }

    let params = batch.iter().flatten();
    let mut stmt = conn.prepare(&sql)?;
    stmt.execute(duckdb::params_from_iter(params))?;
    Ok(())
}

/// Quotes a SQL identifier, doubling embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escapes a string for use inside a single-quoted SQL literal.
fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_set_is_exact() {
        for sentinel in NULL_SENTINELS {
            assert!(is_null_sentinel(sentinel), "{sentinel:?} should be null");
            assert_eq!(normalize_field(sentinel), None);
        }
        for literal in ["42", "N/A", "xx", "0", " ", "..x", "EE"] {
            assert!(!is_null_sentinel(literal), "{literal:?} should survive");
            assert_eq!(normalize_field(literal), Some(literal));
        }
    }

    #[test]
    fn prescan_reads_raw_header() {
        let tmp = std::env::temp_dir().join("statmirror_prescan_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let csv_path = tmp.join("table.csv");
        std::fs::write(&csv_path, "REF_DATE,GEO/Region,Value-Added\n2024,CA,1\n").unwrap();

        let header = prescan_header(&csv_path).unwrap();
        assert_eq!(header, vec!["REF_DATE", "GEO/Region", "Value-Added"]);
        assert_eq!(
            sanitize_column_names(&header),
            vec!["REF_DATE", "GEO_Region", "Value_Added"]
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn prescan_rejects_empty_input() {
        let tmp = std::env::temp_dir().join("statmirror_prescan_empty_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let csv_path = tmp.join("empty.csv");
        std::fs::write(&csv_path, "").unwrap();

        assert!(prescan_header(&csv_path).is_err());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rows_are_padded_and_truncated_to_header_width() {
        let short = csv::StringRecord::from(vec!["2024"]);
        assert_eq!(
            row_from_record(&short, 3),
            vec![Some("2024".to_string()), None, None]
        );

        let long = csv::StringRecord::from(vec!["a", "b", "c", "d"]);
        assert_eq!(row_from_record(&long, 2).len(), 2);
    }

    #[test]
    fn quoting_handles_embedded_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "it''s");
    }

    #[test]
    fn converts_csv_to_parquet_with_nulls_and_renames() {
        let tmp = std::env::temp_dir().join("statmirror_convert_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let csv_path = tmp.join("table.csv");
        std::fs::write(
            &csv_path,
            "REF_DATE,GEO/Region,VALUE\n\
             2024-01,Canada,42\n\
             2024-02,Canada,x\n\
             2024-03,Canada,N/A\n",
        )
        .unwrap();
        let out_path = tmp.join("table.parquet");

        convert_file(&csv_path, &out_path).unwrap();

        let conn = duckdb::Connection::open_in_memory().unwrap();
        let sql = format!(
            "SELECT GEO_Region, VALUE FROM read_parquet('{}') ORDER BY REF_DATE",
            quote_literal(&out_path.to_string_lossy())
        );
        let mut stmt = conn.prepare(&sql).unwrap();
        let rows: Vec<(Option<String>, Option<String>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].1.as_deref(), Some("42"));
        assert_eq!(rows[1].1, None); // 'x' is a suppression sentinel
        assert_eq!(rows[2].1.as_deref(), Some("N/A")); // deliberately not a sentinel

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
