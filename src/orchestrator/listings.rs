//! Listings pipeline: paginate the results pages, parse cards, append.

use super::{RunResult, UnitOutcome};
use crate::config::{ListingsConfig, SyncConfig};
use crate::error::{Result, SyncError};
use crate::extract::listings::ListingsExtractor;
use crate::extract::{PageParser, PageSource};
use crate::load::LoadEngine;
use crate::schema::catalog::LISTINGS;
use crate::schema::{SchemaCatalog, SchemaReplicator};
use crate::warehouse::Warehouse;
use tracing::info;

pub const LISTINGS_PIPELINE: &str = "listings";

pub struct ListingsPipeline {
    catalog: SchemaCatalog,
    config: ListingsConfig,
    loader: LoadEngine,
}

impl ListingsPipeline {
    pub fn new(config: &ListingsConfig, loader: LoadEngine) -> Result<Self> {
        Ok(Self {
            catalog: SchemaCatalog::listings()?,
            config: config.clone(),
            loader,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::new(&config.listings, LoadEngine::from_config(config))
    }

    pub fn run(
        &self,
        source: &mut dyn PageSource,
        parser: &dyn PageParser,
        destination: &mut dyn Warehouse,
    ) -> Result<RunResult> {
        let mut run = RunResult::new(LISTINGS_PIPELINE);
        SchemaReplicator::new(&self.catalog).create_all(destination)?;

        let extraction = ListingsExtractor::new(source, parser, &self.config).extract();
        info!(
            pages = extraction.pages.len(),
            records = extraction.records.len(),
            "listings collected"
        );
        if let Some((url, e)) = extraction.failure {
            run.record_error(url, e)?;
        }

        let entity = self
            .catalog
            .entity(LISTINGS)
            .ok_or_else(|| SyncError::Schema(format!("catalog has no {} entity", LISTINGS)))?;
        if extraction.records.is_empty() {
            run.record(LISTINGS, UnitOutcome::SkippedEmpty);
        } else {
            match self.loader.append(destination, entity, extraction.records) {
                Ok(committed) => run.record(LISTINGS, UnitOutcome::Succeeded(committed)),
                Err(e) => run.record_error(LISTINGS, e)?,
            }
        }

        Ok(run.finish())
    }
}
