//! Snapshot sources - complete copies of one entity
//!
//! Used by full-refresh runs (origin table scan) and by origin seeding
//! (static CSV exports).

use crate::error::{Result, SyncError};
use crate::schema::{ColumnDef, Entity};
use crate::warehouse::{Record, Value, Warehouse};
use csv::{ReaderBuilder, Trim};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub trait SnapshotSource {
    /// Every row of `entity`, conformed to its column types.
    fn snapshot(&mut self, entity: &Entity) -> Result<Vec<Record>>;
}

/// Full-table scan of an origin warehouse
pub struct WarehouseSnapshot<'a> {
    origin: &'a dyn Warehouse,
}

impl<'a> WarehouseSnapshot<'a> {
    pub fn new(origin: &'a dyn Warehouse) -> Self {
        Self { origin }
    }
}

impl<'a> SnapshotSource for WarehouseSnapshot<'a> {
    fn snapshot(&mut self, entity: &Entity) -> Result<Vec<Record>> {
        let records = self.origin.scan(entity)?;
        info!(entity = %entity.name, rows = records.len(), "origin snapshot read");
        Ok(records)
    }
}

/// Static CSV exports, one file per entity (`Entity::source_file`).
///
/// Headers are matched to columns ignoring case and punctuation, so
/// `Price_PerUnit` fills `pricePerUnit`. Unknown headers are ignored.
/// A row that fails coercion is skipped.
pub struct CsvSnapshotSource {
    dir: PathBuf,
    skipped: usize,
}

fn normalize_header(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

impl CsvSnapshotSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            skipped: 0,
        }
    }

    /// Rows dropped so far because a cell failed coercion
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn path_for(&self, entity: &Entity) -> Result<PathBuf> {
        entity
            .source_file
            .as_ref()
            .map(|file| self.dir.join(file))
            .ok_or_else(|| {
                SyncError::Configuration(format!("{} has no source file", entity.name))
            })
    }
}

impl SnapshotSource for CsvSnapshotSource {
    fn snapshot(&mut self, entity: &Entity) -> Result<Vec<Record>> {
        let path = self.path_for(entity)?;
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_path(&path)?;

        // header position -> column
        let mapping: Vec<Option<&ColumnDef>> = rdr
            .headers()?
            .iter()
            .map(|header| {
                let key = normalize_header(header);
                entity.columns.iter().find(|c| normalize_header(&c.name) == key)
            })
            .collect();
        debug!(
            entity = %entity.name,
            mapped = mapping.iter().filter(|m| m.is_some()).count(),
            "csv headers mapped"
        );

        let mut records = Vec::new();
        for (line, row) in rdr.records().enumerate() {
            let row = row?;
            let parsed: Result<Record> = mapping
                .iter()
                .zip(row.iter())
                .filter_map(|(column, cell)| column.map(|c| (c, cell)))
                .map(|(column, cell)| {
                    Value::coerce(column.kind, cell)
                        .map(|value| (column.name.clone(), value))
                        .map_err(|e| SyncError::Parse(format!("{}: {}", column.name, e)))
                })
                .collect();
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => {
                    self.skipped += 1;
                    warn!(file = %path.display(), line = line + 2, error = %e, "skipping csv row");
                }
            }
        }

        info!(entity = %entity.name, file = %path.display(), rows = records.len(), "csv snapshot read");
        Ok(records)
    }
}
