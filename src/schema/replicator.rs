//! Schema Replicator - shapes the destination in dependency-safe order
//!
//! Drops run children-first (cascading where supported), creates run
//! parents-first. Both are idempotent and each runs as one DDL transaction.
//! Any failure here is fatal for the run.

use super::SchemaCatalog;
use crate::error::{Result, SyncError};
use crate::warehouse::{SqlDialect, Warehouse};
use tracing::{error, info};

pub struct SchemaReplicator<'a> {
    catalog: &'a SchemaCatalog,
}

impl<'a> SchemaReplicator<'a> {
    pub fn new(catalog: &'a SchemaCatalog) -> Self {
        Self { catalog }
    }

    pub fn drop_statements(&self, dialect: SqlDialect) -> Vec<String> {
        self.catalog
            .reverse_order()
            .into_iter()
            .map(|entity| dialect.drop_table(entity))
            .collect()
    }

    pub fn create_statements(&self, dialect: SqlDialect) -> Vec<String> {
        self.catalog
            .forward_order()
            .into_iter()
            .map(|entity| dialect.create_table(entity))
            .collect()
    }

    /// Drop every entity, children before parents. Absent tables are fine.
    pub fn drop_all(&self, warehouse: &mut dyn Warehouse) -> Result<()> {
        let statements = self.drop_statements(warehouse.dialect());
        info!(tables = statements.len(), "dropping destination tables (reverse dependency order)");
        self.run(warehouse, &statements, "drop")
    }

    /// Create every entity, parents before children. Existing tables are fine.
    pub fn create_all(&self, warehouse: &mut dyn Warehouse) -> Result<()> {
        let statements = self.create_statements(warehouse.dialect());
        info!(tables = statements.len(), "creating destination tables (forward dependency order)");
        self.run(warehouse, &statements, "create")
    }

    fn run(&self, warehouse: &mut dyn Warehouse, statements: &[String], step: &str) -> Result<()> {
        warehouse.execute_batch(statements).map_err(|e| {
            error!(step, error = %e, "schema step failed");
            match e {
                SyncError::Connection(msg) => SyncError::Connection(msg),
                other => SyncError::Schema(format!("{} failed: {}", step, other)),
            }
        })
    }
}
