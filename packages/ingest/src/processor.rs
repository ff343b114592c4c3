//! The production dataset processor: WDS fetch + isolated conversion.

use std::path::PathBuf;
use std::time::Duration;

use statmirror_catalog::naming::create_folder_name;
use statmirror_catalog_models::ManifestEntry;
use statmirror_wds::{FetchLimits, FetchOutcome, WdsClient};

use crate::display::format_display_title;
use crate::{ProcessError, ProcessOutcome, RunConfig};

/// Processes datasets against the real WDS API and local disk.
pub struct WdsProcessor {
    client: WdsClient,
    limits: FetchLimits,
    data_dir: PathBuf,
    convert_timeout: Duration,
}

impl WdsProcessor {
    /// Creates a processor from a client and the run's configuration.
    #[must_use]
    pub fn new(client: WdsClient, config: &RunConfig) -> Self {
        Self {
            client,
            limits: config.limits,
            data_dir: config.data_dir.clone(),
            convert_timeout: config.convert_timeout,
        }
    }
}

#[async_trait::async_trait]
impl crate::DatasetProcessor for WdsProcessor {
    async fn process(&self, product_id: i64, title: &str) -> Result<ProcessOutcome, ProcessError> {
        let label = format_display_title(product_id, title);
        log::info!("{label} - Starting...");

        let fetched =
            match statmirror_wds::fetch_and_extract(&self.client, self.limits, product_id, &label)
                .await?
            {
                FetchOutcome::Skipped(reason) => {
                    return Ok(ProcessOutcome::Skipped(reason.to_string()));
                }
                FetchOutcome::Fetched(fetched) => fetched,
            };

        log::info!("{label} - Converting to parquet...");

        let folder_name = create_folder_name(product_id, title);
        let out_dir = self.data_dir.join(&folder_name);
        std::fs::create_dir_all(&out_dir)?;
        let out_file = out_dir.join(format!("{product_id}.parquet"));

        statmirror_convert::worker::run_isolated(
            &fetched.csv_path,
            &out_file,
            self.convert_timeout,
        )
        .await?;

        #[allow(clippy::cast_precision_loss)] // display/accounting MB value
        let size_mb = std::fs::metadata(&out_file)?.len() as f64 / 1e6;
        log::info!("{label} - Complete ({size_mb:.1}MB)");

        Ok(ProcessOutcome::Ingested(ManifestEntry {
            product_id,
            title: title.to_string(),
            size_mb,
            file_path: format!("{folder_name}/{product_id}.parquet"),
        }))
    }
}
