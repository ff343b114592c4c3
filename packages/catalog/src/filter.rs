//! Selection filtering: exclusion rules and the new-dataset cap.

use std::collections::BTreeSet;

use statmirror_catalog_models::{CatalogSnapshot, DecisionReason, ProcessingDecision};

/// Literal title substring flagging massive internal tables that are
/// excluded from ingestion by default. Case-sensitive.
pub const HIDDEN_MARKER: &str = "INVISIBLE";

/// Applies the exclusion rules to a catalog snapshot.
///
/// Removes datasets already present in the object store (`existing_ids`),
/// optionally removes hidden/internal tables (title contains
/// [`HIDDEN_MARKER`]), and truncates to the first `limit` remaining
/// datasets in original order. `Some(0)` yields an empty selection;
/// `None` means unlimited.
#[must_use]
pub fn filter_catalog(
    catalog: &CatalogSnapshot,
    existing_ids: &BTreeSet<i64>,
    skip_hidden: bool,
    limit: Option<usize>,
) -> CatalogSnapshot {
    let mut datasets: Vec<_> = catalog
        .datasets
        .iter()
        .filter(|d| !existing_ids.contains(&d.product_id))
        .filter(|d| !(skip_hidden && d.title.contains(HIDDEN_MARKER)))
        .cloned()
        .collect();

    if let Some(limit) = limit {
        datasets.truncate(limit);
    }

    CatalogSnapshot::new(datasets)
}

/// Caps only the `new` partition of a decision list.
///
/// Refresh obligations for already-tracked datasets must never be starved
/// by a cap meant to bound onboarding of brand-new datasets, so every
/// `update_due` decision survives regardless of `limit`. Relative order is
/// preserved within each partition.
#[must_use]
pub fn apply_limit_to_new(
    decisions: Vec<ProcessingDecision>,
    limit: Option<usize>,
) -> Vec<ProcessingDecision> {
    let Some(limit) = limit else {
        return decisions;
    };

    let (new, updates): (Vec<_>, Vec<_>) = decisions
        .into_iter()
        .partition(|d| d.reason == DecisionReason::New);

    let mut limited: Vec<_> = new.into_iter().take(limit).collect();
    limited.extend(updates);
    limited
}

#[cfg(test)]
mod tests {
    use super::*;
    use statmirror_catalog_models::DatasetDescriptor;

    fn dataset(product_id: i64, title: &str) -> DatasetDescriptor {
        DatasetDescriptor {
            product_id,
            title: title.to_string(),
            subject: None,
            frequency: "Monthly".to_string(),
            release_time: String::new(),
            dimension_count: 2,
            row_count: 100,
            available: false,
            last_ingestion_date: None,
        }
    }

    fn decision(product_id: i64, reason: DecisionReason) -> ProcessingDecision {
        ProcessingDecision {
            product_id,
            title: format!("Dataset {product_id}"),
            frequency: "Monthly".to_string(),
            reason,
        }
    }

    #[test]
    fn filters_existing_hidden_and_caps_in_order() {
        // Seven datasets: two hidden, one already present, limit 2 — the
        // selection is exactly the first two remaining, in original order.
        let catalog = CatalogSnapshot::new(vec![
            dataset(1, "Trade"),
            dataset(2, "INVISIBLE mega table"),
            dataset(3, "Immigration"),
            dataset(4, "Labour force"),
            dataset(5, "Prefix INVISIBLE suffix"),
            dataset(6, "Housing"),
            dataset(7, "Energy"),
        ]);
        let existing = BTreeSet::from([3]);

        let selected = filter_catalog(&catalog, &existing, true, Some(2));

        let ids: Vec<i64> = selected.datasets.iter().map(|d| d.product_id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn hidden_marker_is_case_sensitive() {
        let catalog = CatalogSnapshot::new(vec![dataset(1, "invisible in lowercase")]);
        let selected = filter_catalog(&catalog, &BTreeSet::new(), true, None);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn skip_hidden_false_keeps_hidden_tables() {
        let catalog = CatalogSnapshot::new(vec![dataset(1, "INVISIBLE table")]);
        let selected = filter_catalog(&catalog, &BTreeSet::new(), false, None);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn limit_zero_selects_nothing() {
        let catalog = CatalogSnapshot::new(vec![dataset(1, "Trade")]);
        let selected = filter_catalog(&catalog, &BTreeSet::new(), true, Some(0));
        assert!(selected.is_empty());
    }

    #[test]
    fn cap_never_drops_updates() {
        let decisions = vec![
            decision(1, DecisionReason::New),
            decision(2, DecisionReason::UpdateDue),
            decision(3, DecisionReason::New),
            decision(4, DecisionReason::UpdateDue),
            decision(5, DecisionReason::New),
        ];

        let limited = apply_limit_to_new(decisions, Some(1));

        let new_count = limited
            .iter()
            .filter(|d| d.reason == DecisionReason::New)
            .count();
        let update_ids: Vec<i64> = limited
            .iter()
            .filter(|d| d.reason == DecisionReason::UpdateDue)
            .map(|d| d.product_id)
            .collect();
        assert_eq!(new_count, 1);
        assert_eq!(limited[0].product_id, 1); // first new kept, in order
        assert_eq!(update_ids, vec![2, 4]);
    }

    #[test]
    fn no_limit_passes_through() {
        let decisions = vec![
            decision(1, DecisionReason::New),
            decision(2, DecisionReason::UpdateDue),
        ];
        assert_eq!(apply_limit_to_new(decisions.clone(), None), decisions);
    }

    #[test]
    fn limit_larger_than_new_partition_keeps_everything() {
        let decisions = vec![
            decision(1, DecisionReason::New),
            decision(2, DecisionReason::UpdateDue),
        ];
        let limited = apply_limit_to_new(decisions, Some(10));
        assert_eq!(limited.len(), 2);
    }
}
