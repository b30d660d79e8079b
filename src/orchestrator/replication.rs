//! Full-refresh replication (origin store -> destination) and origin seeding
//! from static CSV exports.

use super::{RunResult, UnitOutcome};
use crate::error::Result;
use crate::extract::SnapshotSource;
use crate::load::{LoadEngine, LoadMode};
use crate::schema::{Entity, SchemaCatalog, SchemaReplicator};
use crate::warehouse::{Record, Warehouse};
use tracing::info;

pub const REPLICATION: &str = "replication";
pub const SEED_ORIGIN: &str = "seed-origin";

/// Snapshot, derive, load. Shared by both full-copy pipelines.
fn copy_entity(
    source: &mut dyn SnapshotSource,
    destination: &mut dyn Warehouse,
    loader: &LoadEngine,
    entity: &Entity,
    mode: LoadMode,
) -> Result<UnitOutcome> {
    let mut records: Vec<Record> = source.snapshot(entity)?;
    for record in records.iter_mut() {
        entity.apply_derivations(record)?;
    }
    if records.is_empty() {
        return Ok(UnitOutcome::SkippedEmpty);
    }
    let committed = loader.load(destination, entity, records, mode)?;
    Ok(UnitOutcome::Succeeded(committed))
}

fn copy_all(
    run: &mut RunResult,
    catalog: &SchemaCatalog,
    source: &mut dyn SnapshotSource,
    destination: &mut dyn Warehouse,
    loader: &LoadEngine,
    mode: LoadMode,
) -> Result<()> {
    for entity in catalog.forward_order() {
        info!(entity = %entity.name, "copying entity");
        match copy_entity(source, destination, loader, entity, mode) {
            Ok(outcome) => run.record(entity.name.clone(), outcome),
            Err(e) => run.record_error(entity.name.clone(), e)?,
        }
    }
    Ok(())
}

/// Drop, recreate and fully reload every entity of the catalog.
pub struct ReplicationPipeline<'a> {
    catalog: &'a SchemaCatalog,
    loader: LoadEngine,
}

impl<'a> ReplicationPipeline<'a> {
    pub fn new(catalog: &'a SchemaCatalog, loader: LoadEngine) -> Self {
        Self { catalog, loader }
    }

    pub fn run(
        &self,
        source: &mut dyn SnapshotSource,
        destination: &mut dyn Warehouse,
    ) -> Result<RunResult> {
        let mut run = RunResult::new(REPLICATION);

        let replicator = SchemaReplicator::new(self.catalog);
        replicator.drop_all(destination)?;
        replicator.create_all(destination)?;

        copy_all(
            &mut run,
            self.catalog,
            source,
            destination,
            &self.loader,
            LoadMode::Replace,
        )?;
        Ok(run.finish())
    }
}

/// Populate the origin store from static exports. Existing keys are kept,
/// so seeding twice is harmless.
pub struct OriginSeeder<'a> {
    catalog: &'a SchemaCatalog,
    loader: LoadEngine,
}

impl<'a> OriginSeeder<'a> {
    pub fn new(catalog: &'a SchemaCatalog, batch_size: usize) -> Self {
        Self {
            catalog,
            loader: LoadEngine::new(batch_size, true),
        }
    }

    pub fn run(&self, source: &mut dyn SnapshotSource, origin: &mut dyn Warehouse) -> Result<RunResult> {
        let mut run = RunResult::new(SEED_ORIGIN);
        SchemaReplicator::new(self.catalog).create_all(origin)?;
        copy_all(
            &mut run,
            self.catalog,
            source,
            origin,
            &self.loader,
            LoadMode::Append,
        )?;
        Ok(run.finish())
    }
}
