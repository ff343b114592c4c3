#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the statistical data mirror.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use statmirror_catalog::filter::{apply_limit_to_new, filter_catalog};
use statmirror_catalog::reconcile::{
    merge_metadata, recompute_availability, reconcile, stamp_ingested,
};
use statmirror_catalog_models::DecisionReason;
use statmirror_ingest::{DatasetProcessor, RunAccumulator, RunConfig, WdsProcessor, run_batch};
use statmirror_store::StoreClient;
use statmirror_wds::WdsClient;

#[derive(Parser)]
#[command(name = "statmirror", about = "Incremental mirror of a statistical open-data catalog")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the fresh catalog, merge with the persisted snapshot, and persist it
    Discover,
    /// Show which datasets would be processed (new vs update-due)
    Plan {
        /// Maximum number of new datasets (overrides the `LIMIT` env var)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Full ingestion pass: reconcile, fetch, convert, persist
    Run {
        /// Maximum number of new datasets (overrides the `LIMIT` env var).
        /// Updates due are never capped.
        #[arg(long)]
        limit: Option<usize>,
        /// Concurrent dataset workers
        #[arg(long, default_value = "1")]
        workers: usize,
        /// Soft ceiling on total materialized output this run, in GB
        #[arg(long, default_value = "10.0")]
        max_total_gb: f64,
        /// Also ingest hidden/internal tables
        #[arg(long)]
        include_hidden: bool,
        /// Local directory mirroring the store's data prefix
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Recompute availability flags and ingestion stamps from store ground truth
    SyncCatalog,
    /// Print crawl targets for dataset folders present in the store
    CrawlerTargets,
    /// Conversion worker entry (spawned internally per dataset)
    #[command(hide = true)]
    ConvertWorker {
        /// Input CSV path
        input: PathBuf,
        /// Output Parquet path
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::ConvertWorker { input, output } => {
            statmirror_convert::convert_file(&input, &output)?;
        }
        Commands::Discover => discover().await?,
        Commands::Plan { limit } => plan(limit).await?,
        Commands::Run {
            limit,
            workers,
            max_total_gb,
            include_hidden,
            data_dir,
        } => {
            let config = RunConfig {
                workers,
                max_total_gb,
                limit_new: resolve_limit(limit),
                skip_hidden: !include_hidden,
                data_dir,
                ..RunConfig::default()
            };
            run(config).await?;
        }
        Commands::SyncCatalog => sync_catalog().await?,
        Commands::CrawlerTargets => crawler_targets().await?,
    }

    Ok(())
}

/// CLI flag wins; otherwise the `LIMIT` environment variable applies.
fn resolve_limit(cli_limit: Option<usize>) -> Option<usize> {
    cli_limit.or_else(|| std::env::var("LIMIT").ok().and_then(|s| s.parse().ok()))
}

async fn discover() -> Result<(), Box<dyn std::error::Error>> {
    let client = WdsClient::new()?;
    let store = StoreClient::from_env()?;

    let fresh = client.list_all_datasets().await?;
    let previous = store.read_catalog().await;
    let merged = merge_metadata(&fresh, &previous);

    store.write_catalog(&merged).await?;
    log::info!("Catalog updated: {} datasets", merged.len());
    Ok(())
}

async fn plan(limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let client = WdsClient::new()?;
    let store = StoreClient::from_env()?;

    let fresh = client.list_all_datasets().await?;
    let previous = store.read_catalog().await;

    let decisions = reconcile(&fresh, &previous, Utc::now());
    let new_before = count_by_reason(&decisions, DecisionReason::New);
    let updates = count_by_reason(&decisions, DecisionReason::UpdateDue);

    let limit = resolve_limit(limit);
    let decisions = apply_limit_to_new(decisions, limit);

    println!("{:<12} {:<12} {:<12} TITLE", "PRODUCT", "REASON", "FREQUENCY");
    println!("{}", "-".repeat(70));
    for d in &decisions {
        println!(
            "{:<12} {:<12} {:<12} {}",
            d.product_id, d.reason, d.frequency, d.title
        );
    }

    match limit {
        Some(limit) => println!(
            "\nLIMIT={limit}: {} of {new_before} new, {updates} updates (all processed)",
            count_by_reason(&decisions, DecisionReason::New),
        ),
        None => println!("\nNo limit: {new_before} new, {updates} updates"),
    }
    Ok(())
}

#[allow(clippy::too_many_lines)]
async fn run(config: RunConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = WdsClient::new()?;
    let store = StoreClient::from_env()?;

    // Reconcile the fresh catalog against tracked ingestion history.
    let fresh = client.list_all_datasets().await?;
    let previous = store.read_catalog().await;
    let merged = merge_metadata(&fresh, &previous);

    let visible = filter_catalog(&merged, &BTreeSet::new(), config.skip_hidden, None);
    let mut decisions = reconcile(&visible, &previous, Utc::now());

    // Ground truth from the store: a brand-new dataset that already has a
    // folder is not onboarded again. Updates are left alone — their folder
    // is present by definition and must be refreshed anyway.
    let existing = store.existing_dataset_ids().await?;
    log::info!("Already have {} datasets in store", existing.len());
    decisions.retain(|d| {
        d.reason == DecisionReason::UpdateDue || !existing.contains(&d.product_id)
    });

    let new_before = count_by_reason(&decisions, DecisionReason::New);
    let updates = count_by_reason(&decisions, DecisionReason::UpdateDue);
    let decisions = apply_limit_to_new(decisions, config.limit_new);
    match config.limit_new {
        Some(limit) => log::info!(
            "LIMIT={limit}: {} of {new_before} new datasets, {updates} updates due",
            count_by_reason(&decisions, DecisionReason::New),
        ),
        None => log::info!("{new_before} new datasets, {updates} updates due"),
    }

    // Orchestrate fetch + convert across the selection.
    let accumulator = Arc::new(RunAccumulator::new());
    let processor: Arc<dyn DatasetProcessor> =
        Arc::new(WdsProcessor::new(client, &config));
    let summary = run_batch(&processor, &decisions, &accumulator, &config).await;

    // Persist the manifest even when empty; failing to write it is fatal.
    let manifest = accumulator.manifest();
    store.write_manifest(&manifest).await?;
    store.upload_ingested(&manifest, &config.data_dir).await?;

    // Stamp ingestion dates and recompute availability from ground truth.
    let ingested_ids: BTreeSet<i64> = manifest.iter().map(|e| e.product_id).collect();
    let stamped = stamp_ingested(&merged, &ingested_ids, Utc::now());
    let existing = store.existing_dataset_ids().await?;
    let final_catalog = recompute_availability(&stamped, &existing);
    store.write_catalog(&final_catalog).await?;

    log::info!(
        "Run complete: {} ingested, {} skipped, {} failed",
        summary.ingested,
        summary.skipped,
        summary.failed
    );
    log::info!("Total size: {:.2} GB", summary.total_size_mb / 1000.0);
    log::info!("Manifest saved to {}", store.manifest_key());
    Ok(())
}

async fn sync_catalog() -> Result<(), Box<dyn std::error::Error>> {
    let store = StoreClient::from_env()?;

    let catalog = store.read_catalog().await;
    if catalog.is_empty() {
        log::warn!("No catalog snapshot in store; run discover first");
        return Ok(());
    }

    let manifest = store.read_manifest().await?;
    let ingested_ids: BTreeSet<i64> = manifest.iter().map(|e| e.product_id).collect();
    let catalog = if ingested_ids.is_empty() {
        log::info!("No manifest entries; ingestion dates unchanged");
        catalog
    } else {
        log::info!("Stamping ingestion date for {} datasets", ingested_ids.len());
        stamp_ingested(&catalog, &ingested_ids, Utc::now())
    };

    let existing = store.existing_dataset_ids().await?;
    let catalog = recompute_availability(&catalog, &existing);
    let available = catalog.datasets.iter().filter(|d| d.available).count();

    store.write_catalog(&catalog).await?;
    log::info!("Updated catalog: {available} available out of {}", catalog.len());
    Ok(())
}

async fn crawler_targets() -> Result<(), Box<dyn std::error::Error>> {
    let store = StoreClient::from_env()?;

    let folders = store.existing_dataset_folders().await?;
    log::info!("Found {} dataset folders", folders.len());

    let data_uri = format!("s3://{}/{}", store.bucket(), store.data_prefix());
    let catalog_uri = format!("s3://{}/{}/catalog/", store.bucket(), store.source());
    let targets = statmirror_crawler::crawl_targets(&folders, &data_uri, &catalog_uri);

    for target in &targets {
        println!("{target}");
    }
    Ok(())
}

fn count_by_reason(
    decisions: &[statmirror_catalog_models::ProcessingDecision],
    reason: DecisionReason,
) -> usize {
    decisions.iter().filter(|d| d.reason == reason).count()
}
