#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incremental scope computation for the external schema-crawling service.
//!
//! The managed cataloging service crawls object-store prefixes and
//! registers one table per dataset folder. Re-crawling thousands of
//! already-known folders on every run is wasteful, so this crate computes
//! exactly the *new* folders: it parses the numeric dataset id out of each
//! table name the service already knows (`{digits}_...`; the literal
//! `catalog` table is not a dataset), and keeps only the store folders
//! whose id isn't among them. The service itself is an external
//! collaborator behind [`CatalogingService`].

use std::collections::BTreeSet;

use async_trait::async_trait;
use statmirror_catalog::naming::extract_product_id;

/// Table name the service registers for the catalog snapshot itself.
const CATALOG_TABLE: &str = "catalog";

/// Boxed error for trait implementors; the service surface is external
/// and its failure types aren't ours to enumerate.
pub type ServiceError = Box<dyn std::error::Error + Send + Sync>;

/// The external schema-crawling/cataloging service, interface only.
#[async_trait]
pub trait CatalogingService: Send + Sync {
    /// Table names the service currently knows in `database`.
    ///
    /// # Errors
    ///
    /// Implementation-defined service failures.
    async fn list_table_names(&self, database: &str) -> Result<Vec<String>, ServiceError>;

    /// Replaces the service's crawl targets for `database` and triggers an
    /// asynchronous crawl.
    ///
    /// # Errors
    ///
    /// Implementation-defined service failures.
    async fn sync_targets(&self, database: &str, targets: &[String]) -> Result<(), ServiceError>;
}

/// Parses the dataset ids the service already knows from its table names.
///
/// Tables are named `{product_id}_{slug}` with the id up front; names not
/// matching that shape, and the literal `catalog` table, are excluded from
/// the known set.
#[must_use]
pub fn known_ids_from_tables<'a, I>(names: I) -> BTreeSet<i64>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .filter(|name| *name != CATALOG_TABLE)
        .filter_map(|name| {
            let (prefix, _) = name.split_once('_')?;
            if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            prefix.parse().ok()
        })
        .collect()
}

/// Keeps only the dataset folders whose id is not yet known to the
/// service. Folders that don't parse as a folder key can't be matched
/// against the known set and are left out.
#[must_use]
pub fn new_folders(folders: &[String], known_ids: &BTreeSet<i64>) -> Vec<String> {
    folders
        .iter()
        .filter(|folder| {
            extract_product_id(folder).is_some_and(|id| !known_ids.contains(&id))
        })
        .cloned()
        .collect()
}

/// Assembles the crawl-target list: one target per new dataset folder plus
/// the fixed catalog-prefix target.
#[must_use]
pub fn crawl_targets(
    folders: &[String],
    data_prefix: &str,
    catalog_prefix: &str,
) -> Vec<String> {
    let mut targets: Vec<String> = folders
        .iter()
        .map(|folder| format!("{data_prefix}{folder}/"))
        .collect();
    targets.push(catalog_prefix.to_string());
    targets
}

/// Drives one incremental crawler sync: asks the service what it knows,
/// computes the new folders, and pushes the updated target list. Returns
/// the number of new folders supplied.
///
/// # Errors
///
/// Propagates service failures from [`CatalogingService`].
pub async fn sync_crawler(
    service: &dyn CatalogingService,
    folders: &[String],
    data_prefix: &str,
    catalog_prefix: &str,
    database: &str,
) -> Result<usize, ServiceError> {
    let tables = service.list_table_names(database).await?;
    let known = known_ids_from_tables(tables.iter().map(String::as_str));
    log::info!("Cataloging service knows {} datasets", known.len());

    let fresh = new_folders(folders, &known);
    if fresh.is_empty() {
        log::info!("No new dataset folders; crawl targets unchanged");
        return Ok(0);
    }

    let targets = crawl_targets(&fresh, data_prefix, catalog_prefix);
    service.sync_targets(database, &targets).await?;
    log::info!(
        "Updated crawler with {} targets ({} new folders + catalog)",
        targets.len(),
        fresh.len()
    );

    Ok(fresh.len())
}
