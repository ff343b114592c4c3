#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch ingestion orchestrator.
//!
//! Drives fetch + convert across many datasets: a bounded worker pool
//! (default one worker, to cap peak memory) takes the filtered selection
//! in order, each dataset runs pending → fetching → converting → {done |
//! skipped | failed} with no retries, and one mutex-guarded accumulator
//! collects the cumulative output size and the run manifest. The total-
//! size cap is checked at submission time only — work already in flight
//! always drains to completion, so the realized total can overshoot the
//! cap by a bounded amount.
//!
//! A failure while processing one dataset is caught at the worker
//! boundary, logged with a truncated message, and contributes nothing;
//! only catalog-read and manifest-write failures abort a run.

pub mod display;
pub mod processor;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use statmirror_catalog_models::{ManifestEntry, ProcessingDecision};
use statmirror_wds::FetchLimits;

pub use processor::WdsProcessor;

/// Knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Concurrent dataset workers. One by default: datasets are large and
    /// sequential processing caps peak memory.
    pub workers: usize,
    /// Soft ceiling on cumulative materialized output per run, in GB.
    /// Checked at submission time only.
    pub max_total_gb: f64,
    /// Cap on brand-new datasets per run (`None` = unlimited). Updates
    /// due are never capped.
    pub limit_new: Option<usize>,
    /// Whether hidden/internal tables are excluded from selection.
    pub skip_hidden: bool,
    /// Local directory that mirrors the store's data prefix.
    pub data_dir: std::path::PathBuf,
    /// Size ceilings for archive fetches.
    pub limits: FetchLimits,
    /// Wall-clock budget for one conversion worker.
    pub convert_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            max_total_gb: 10.0,
            limit_new: None,
            skip_hidden: true,
            data_dir: std::path::PathBuf::from("data"),
            limits: FetchLimits::default(),
            convert_timeout: statmirror_convert::worker::DEFAULT_TIMEOUT,
        }
    }
}

/// What one dataset's processing produced.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Materialized locally; the entry belongs in the run manifest.
    Ingested(ManifestEntry),
    /// Skipped by a size ceiling. Not an error.
    Skipped(String),
}

/// A per-dataset failure, reduced to a stable kind plus a message so the
/// orchestrator can apply the log-truncation rule uniformly.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ProcessError {
    /// Stable error-kind name (e.g. `"ConversionTimeout"`).
    pub kind: &'static str,
    /// Full failure message.
    pub message: String,
}

impl From<statmirror_wds::WdsError> for ProcessError {
    fn from(e: statmirror_wds::WdsError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<statmirror_convert::ConvertError> for ProcessError {
    fn from(e: statmirror_convert::ConvertError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for ProcessError {
    fn from(e: std::io::Error) -> Self {
        Self {
            kind: "IoError",
            message: e.to_string(),
        }
    }
}

/// Fetches and materializes a single dataset.
///
/// The production implementation is [`WdsProcessor`]; the seam exists so
/// the orchestrator's cap/drain/failure behavior is testable without a
/// network.
#[async_trait::async_trait]
pub trait DatasetProcessor: Send + Sync {
    /// Processes one dataset to a terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] on any per-dataset failure; the caller
    /// catches it at the worker boundary.
    async fn process(&self, product_id: i64, title: &str) -> Result<ProcessOutcome, ProcessError>;
}

/// Run-scoped shared state: cumulative output size plus the manifest.
///
/// The single shared mutable object of a run. Constructor-injected into
/// workers, guarded by one mutex, and only ever held for pure bookkeeping.
#[derive(Debug, Default)]
pub struct RunAccumulator {
    state: Mutex<AccumulatorState>,
}

#[derive(Debug, Default)]
struct AccumulatorState {
    total_size_mb: f64,
    entries: Vec<ManifestEntry>,
}

impl RunAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one successful ingestion.
    pub fn add(&self, entry: ManifestEntry) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.total_size_mb += entry.size_mb;
        state.entries.push(entry);
    }

    /// Cumulative materialized size so far, in MB.
    #[must_use]
    pub fn total_size_mb(&self) -> f64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .total_size_mb
    }

    /// Snapshot of the manifest collected so far, in completion order.
    #[must_use]
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }
}

/// Terminal-state counts for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Datasets materialized and recorded in the manifest.
    pub ingested: usize,
    /// Datasets skipped by a size ceiling.
    pub skipped: usize,
    /// Datasets that failed fetch or conversion.
    pub failed: usize,
    /// Cumulative materialized size, in MB.
    pub total_size_mb: f64,
}

/// Processes the selection through the worker pool.
///
/// Iterates `selection` in order. Before each submission a worker slot is
/// acquired and the accumulator is checked against the size cap: at or
/// over the cap, submission stops but everything already submitted drains
/// to completion. Per-dataset failures are absorbed here and reflected in
/// the summary only.
pub async fn run_batch(
    processor: &Arc<dyn DatasetProcessor>,
    selection: &[ProcessingDecision],
    accumulator: &Arc<RunAccumulator>,
    config: &RunConfig,
) -> RunSummary {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(config.workers.max(1)));
    let mut handles = Vec::with_capacity(selection.len());

    log::info!(
        "Processing {} datasets with {} workers (cap {} GB)",
        selection.len(),
        config.workers.max(1),
        config.max_total_gb
    );

    for decision in selection {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };

        if accumulator.total_size_mb() / 1000.0 >= config.max_total_gb {
            log::info!(
                "Reached {} GB cap, waiting for remaining jobs...",
                config.max_total_gb
            );
            break;
        }

        let processor = Arc::clone(processor);
        let accumulator = Arc::clone(accumulator);
        let decision = decision.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permit;
            process_one(&*processor, &accumulator, &decision).await
        }));
    }

    let mut summary = RunSummary::default();
    for handle in handles {
        match handle.await {
            Ok(TaskOutcome::Done) => summary.ingested += 1,
            Ok(TaskOutcome::Skipped) => summary.skipped += 1,
            Ok(TaskOutcome::Failed) => summary.failed += 1,
            Err(e) => {
                log::warn!("Worker task aborted: {e}");
                summary.failed += 1;
            }
        }
    }
    summary.total_size_mb = accumulator.total_size_mb();

    summary
}

/// Terminal state of one worker invocation.
enum TaskOutcome {
    Done,
    Skipped,
    Failed,
}

/// One dataset, caught at the worker boundary.
async fn process_one(
    processor: &dyn DatasetProcessor,
    accumulator: &RunAccumulator,
    decision: &ProcessingDecision,
) -> TaskOutcome {
    let label = display::format_display_title(decision.product_id, &decision.title);

    match processor.process(decision.product_id, &decision.title).await {
        Ok(ProcessOutcome::Ingested(entry)) => {
            accumulator.add(entry);
            TaskOutcome::Done
        }
        Ok(ProcessOutcome::Skipped(reason)) => {
            log::info!("{label} - Skipped ({reason})");
            TaskOutcome::Skipped
        }
        Err(e) => {
            log::warn!(
                "{label} - Error: {}",
                display::format_error_message(e.kind, &e.message)
            );
            TaskOutcome::Failed
        }
    }
}
