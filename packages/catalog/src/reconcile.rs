//! Fresh-vs-previous catalog reconciliation.
//!
//! Decides which datasets need action on this run (new vs. due for a
//! refresh) and merges freshly fetched metadata with locally tracked
//! ingestion history. All functions are non-mutating: they return new
//! snapshots and leave their inputs untouched.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use statmirror_catalog_models::{
    CatalogSnapshot, DatasetDescriptor, DecisionReason, ProcessingDecision,
};

use crate::frequency::is_due;

/// Computes the set of datasets needing action on this run.
///
/// Fresh-only datasets, and datasets whose previous record has no
/// ingestion date, become `new`. Datasets present in both catalogs with a
/// recorded ingestion date become `update_due` when the cadence interval
/// has elapsed, and produce no decision otherwise. Datasets present only
/// in `previous` (delisted upstream) produce no decision — whether stale
/// entries should eventually be pruned is an open question upstream, and
/// this function deliberately does not invent deletion semantics.
///
/// Decisions come out in fresh-catalog order.
#[must_use]
pub fn reconcile(
    fresh: &CatalogSnapshot,
    previous: &CatalogSnapshot,
    now: DateTime<Utc>,
) -> Vec<ProcessingDecision> {
    let previous_by_id: BTreeMap<i64, &DatasetDescriptor> = previous
        .datasets
        .iter()
        .map(|d| (d.product_id, d))
        .collect();

    let mut decisions = Vec::new();

    for dataset in &fresh.datasets {
        let reason = match previous_by_id.get(&dataset.product_id) {
            None => Some(DecisionReason::New),
            Some(prev) => match prev.last_ingestion_date {
                // Metadata exists but ingestion never completed.
                None => Some(DecisionReason::New),
                Some(last) => {
                    is_due(&dataset.frequency, last, now).then_some(DecisionReason::UpdateDue)
                }
            },
        };

        if let Some(reason) = reason {
            decisions.push(ProcessingDecision {
                product_id: dataset.product_id,
                title: dataset.title.clone(),
                frequency: dataset.frequency.clone(),
                reason,
            });
        }
    }

    decisions
}

/// Merges fresh catalog metadata with previously tracked ingestion dates.
///
/// A left join on `product_id`: every fresh dataset appears exactly once
/// in the output, fresh metadata wins for all descriptive fields, and only
/// `last_ingestion_date` is recovered from `previous` (null when the
/// dataset is not there or the previous snapshot is empty).
#[must_use]
pub fn merge_metadata(fresh: &CatalogSnapshot, previous: &CatalogSnapshot) -> CatalogSnapshot {
    let previous_dates: BTreeMap<i64, Option<DateTime<Utc>>> = previous
        .datasets
        .iter()
        .map(|d| (d.product_id, d.last_ingestion_date))
        .collect();

    let datasets = fresh
        .datasets
        .iter()
        .map(|d| DatasetDescriptor {
            last_ingestion_date: previous_dates.get(&d.product_id).copied().flatten(),
            ..d.clone()
        })
        .collect();

    CatalogSnapshot::new(datasets)
}

/// Stamps `last_ingestion_date = when` on every dataset in `ingested_ids`,
/// overwriting any prior value. Other datasets are unchanged.
#[must_use]
pub fn stamp_ingested(
    catalog: &CatalogSnapshot,
    ingested_ids: &BTreeSet<i64>,
    when: DateTime<Utc>,
) -> CatalogSnapshot {
    let datasets = catalog
        .datasets
        .iter()
        .map(|d| {
            if ingested_ids.contains(&d.product_id) {
                DatasetDescriptor {
                    last_ingestion_date: Some(when),
                    ..d.clone()
                }
            } else {
                d.clone()
            }
        })
        .collect();

    CatalogSnapshot::new(datasets)
}

/// Recomputes the derived `available` flag from the object store's actual
/// contents. `existing_ids` is the ground-truth id set from the store
/// listing; a stale flag carried in the snapshot is never trusted.
#[must_use]
pub fn recompute_availability(
    catalog: &CatalogSnapshot,
    existing_ids: &BTreeSet<i64>,
) -> CatalogSnapshot {
    let datasets = catalog
        .datasets
        .iter()
        .map(|d| DatasetDescriptor {
            available: existing_ids.contains(&d.product_id),
            ..d.clone()
        })
        .collect();

    CatalogSnapshot::new(datasets)
}
