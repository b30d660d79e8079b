//! Incremental exchange-rate pipeline
//!
//! Resumes the day after the destination's watermark (or at the epoch when
//! empty), splits the outstanding range into calendar-year windows and
//! extracts and appends each window in chronological order.

use super::{RunResult, UnitOutcome};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::extract::{ApiTransport, DateWindow, QuotationExtractor};
use crate::load::LoadEngine;
use crate::schema::catalog::QUOTATIONS;
use crate::schema::{Entity, SchemaCatalog, SchemaReplicator};
use crate::warehouse::Warehouse;
use crate::watermark::WatermarkTracker;
use chrono::NaiveDate;
use tracing::{info, warn};

pub const QUOTATIONS_PIPELINE: &str = "quotations";

pub struct QuotationPipeline {
    catalog: SchemaCatalog,
    currency_code: String,
    page_size: usize,
    epoch: NaiveDate,
    loader: LoadEngine,
}

impl QuotationPipeline {
    pub fn new(currency_code: &str, page_size: usize, epoch: NaiveDate, loader: LoadEngine) -> Result<Self> {
        Ok(Self {
            catalog: SchemaCatalog::quotations()?,
            currency_code: currency_code.to_string(),
            page_size,
            epoch,
            loader,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let api = config.api()?;
        Self::new(
            &api.currency_code,
            api.page_size,
            config.epoch,
            LoadEngine::from_config(config),
        )
    }

    /// Outstanding range for a run on `today`; `None` when up to date.
    pub fn outstanding(&self, destination: &dyn Warehouse, today: NaiveDate) -> Result<Option<DateWindow>> {
        let entity = self.entity()?;
        let key = entity.temporal_key.as_deref().unwrap_or("date");
        let watermark = WatermarkTracker::high_watermark(destination, entity, key)?;
        let resume = WatermarkTracker::resume_date(watermark.as_ref(), self.epoch)?;
        match &watermark {
            Some(mark) => info!(watermark = %mark, resume = %resume, "incremental mode"),
            None => info!(resume = %resume, "destination empty, backfilling from epoch"),
        }
        Ok(DateWindow::new(resume, today))
    }

    pub fn run(
        &self,
        transport: &mut dyn ApiTransport,
        destination: &mut dyn Warehouse,
        today: NaiveDate,
    ) -> Result<RunResult> {
        let mut run = RunResult::new(QUOTATIONS_PIPELINE);
        SchemaReplicator::new(&self.catalog).create_all(destination)?;

        let range = match self.outstanding(destination, today)? {
            Some(range) => range,
            None => {
                info!(today = %today, "destination already up to date");
                return Ok(run.finish());
            }
        };

        let entity = self.entity()?;
        let windows = range.partition_by_year();
        info!(range = %range, windows = windows.len(), "extracting outstanding range");

        let mut extractor = QuotationExtractor::new(transport, &self.currency_code, self.page_size);
        for window in windows {
            let records = match extractor.extract_window(window) {
                Ok(records) => records,
                Err(e) => {
                    warn!(window = %window, error = %e, "window extraction failed, treating as empty");
                    run.record_error(window.to_string(), e)?;
                    continue;
                }
            };
            if records.is_empty() {
                run.record(window.to_string(), UnitOutcome::SkippedEmpty);
                continue;
            }
            match self.loader.append(destination, entity, records) {
                Ok(committed) => run.record(window.to_string(), UnitOutcome::Succeeded(committed)),
                Err(e) => run.record_error(window.to_string(), e)?,
            }
        }
        info!(requests = extractor.requests(), "api requests issued");

        Ok(run.finish())
    }

    fn entity(&self) -> Result<&Entity> {
        self.catalog
            .entity(QUOTATIONS)
            .ok_or_else(|| SyncError::Schema(format!("catalog has no {} entity", QUOTATIONS)))
    }
}
