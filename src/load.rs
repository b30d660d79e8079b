//! Load Engine - writes canonical records into one destination entity
//!
//! Records are validated and de-duplicated by primary key (first occurrence
//! wins) before any SQL is sent. The destination's own key constraints decide
//! cross-run duplicates: in append mode a clash fails the entity, in
//! skip-existing mode the clashing row is ignored.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::schema::{ColumnDef, ColumnDefault, Entity};
use crate::warehouse::{Record, Value, Warehouse};
use chrono::{Local, Utc};
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadMode {
    /// Incremental: the extraction window already excludes committed keys
    Append,
    /// Full refresh: the table must be empty
    Replace,
}

#[derive(Clone, Debug)]
pub struct LoadEngine {
    batch_size: usize,
    skip_existing: bool,
}

impl Default for LoadEngine {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            skip_existing: false,
        }
    }
}

/// Client-side value for a column default, used when only part of a batch
/// supplies the column.
fn default_value(column: &ColumnDef) -> Result<Value> {
    match &column.default {
        None => Ok(Value::Null),
        Some(ColumnDefault::Literal(literal)) => Value::coerce(column.kind, literal),
        Some(ColumnDefault::CurrentDate) => Ok(Value::Date(Local::now().date_naive())),
        Some(ColumnDefault::CurrentTimestamp) => Ok(Value::Timestamp(Utc::now())),
    }
}

impl LoadEngine {
    pub fn new(batch_size: usize, skip_existing: bool) -> Self {
        Self {
            batch_size: batch_size.max(1),
            skip_existing,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.load_batch_size, config.skip_existing)
    }

    pub fn skip_existing(&self) -> bool {
        self.skip_existing
    }

    /// Conform, validate and de-duplicate. Any record without a full primary
    /// key or with a NULL in a required column rejects the whole set.
    pub fn prepare(&self, entity: &Entity, records: Vec<Record>) -> Result<Vec<Record>> {
        let required: Vec<&ColumnDef> = entity
            .columns
            .iter()
            .filter(|c| !c.nullable && c.default.is_none())
            .collect();

        let mut seen = HashSet::with_capacity(records.len());
        let mut unique = Vec::with_capacity(records.len());
        let mut duplicates = 0usize;

        for record in records {
            let record = entity.conform(record)?;
            let key = entity.key_of(&record).ok_or_else(|| {
                SyncError::ConstraintViolation(format!(
                    "{}: record without primary key ({})",
                    entity.name,
                    entity.primary_key.join(", ")
                ))
            })?;
            if let Some(column) = required.iter().find(|c| record.value(&c.name).is_null()) {
                return Err(SyncError::ConstraintViolation(format!(
                    "{}: NULL in required column {} (key {})",
                    entity.name, column.name, key
                )));
            }
            if seen.insert(key) {
                unique.push(record);
            } else {
                duplicates += 1;
            }
        }

        if duplicates > 0 {
            warn!(entity = %entity.name, duplicates, "dropped duplicate keys within batch");
        }
        Ok(unique)
    }

    /// Insert `records`; returns the number of rows committed.
    pub fn load(
        &self,
        warehouse: &mut dyn Warehouse,
        entity: &Entity,
        records: Vec<Record>,
        mode: LoadMode,
    ) -> Result<u64> {
        let mut records = self.prepare(entity, records)?;
        if records.is_empty() {
            debug!(entity = %entity.name, "nothing to load");
            return Ok(0);
        }

        if mode == LoadMode::Replace {
            let existing = warehouse.count_rows(&entity.name)?;
            if existing > 0 {
                return Err(SyncError::ConstraintViolation(format!(
                    "{}: full replace into a table holding {} rows",
                    entity.name, existing
                )));
            }
        }

        let columns = entity.insert_columns(&records);
        for column in columns.iter().filter(|c| c.default.is_some()) {
            let fallback = default_value(column)?;
            for record in records.iter_mut().filter(|r| r.value(&column.name).is_null()) {
                record.set(column.name.clone(), fallback.clone());
            }
        }

        let skip_conflicts = self.skip_existing && mode == LoadMode::Append;
        let mut committed = 0u64;
        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            let written = warehouse
                .insert_rows(entity, &columns, batch, skip_conflicts)
                .map_err(|e| {
                    warn!(
                        entity = %entity.name,
                        batch = index,
                        committed,
                        error = %e,
                        "load batch failed"
                    );
                    e
                })?;
            committed += written;
            debug!(entity = %entity.name, batch = index, rows = written, "batch committed");
        }

        let ignored = records.len() as u64 - committed;
        info!(
            entity = %entity.name,
            mode = ?mode,
            committed,
            ignored,
            "entity loaded"
        );
        Ok(committed)
    }

    pub fn append(&self, warehouse: &mut dyn Warehouse, entity: &Entity, records: Vec<Record>) -> Result<u64> {
        self.load(warehouse, entity, records, LoadMode::Append)
    }

    pub fn replace(&self, warehouse: &mut dyn Warehouse, entity: &Entity, records: Vec<Record>) -> Result<u64> {
        self.load(warehouse, entity, records, LoadMode::Replace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::catalog;
    use crate::warehouse::{SqlDialect, SqliteWarehouse};
    use chrono::NaiveDate;

    fn quotation(day: u32, rate: f64) -> Record {
        Record::new()
            .with("date", NaiveDate::from_ymd_opt(2024, 6, day).unwrap())
            .with("currencyCode", "USD")
            .with("exchangeRate", rate)
    }

    fn warehouse(entity: &Entity) -> SqliteWarehouse {
        let mut wh = SqliteWarehouse::in_memory().unwrap();
        wh.execute_batch(&[SqlDialect::Sqlite.create_table(entity)]).unwrap();
        wh
    }

    #[test]
    fn test_first_occurrence_wins() {
        let entity = catalog::quotations();
        let mut wh = warehouse(&entity);
        let engine = LoadEngine::new(2, false);
        let records = vec![quotation(10, 1.0), quotation(11, 2.0), quotation(10, 3.0)];

        assert_eq!(engine.append(&mut wh, &entity, records).unwrap(), 2);
        let rows = wh.scan(&entity).unwrap();
        let first = rows
            .iter()
            .find(|r| r.value("date").as_date() == NaiveDate::from_ymd_opt(2024, 6, 10))
            .unwrap();
        assert_eq!(first.value("exchangeRate"), &Value::Numeric(1.0));
        // literal default filled server-side
        assert_eq!(first.value("source"), &Value::Text("BCRA".into()));
    }

    #[test]
    fn test_missing_key_or_required_value_is_rejected() {
        let entity = catalog::quotations();
        let engine = LoadEngine::default();

        let no_key = Record::new().with("currencyCode", "USD").with("exchangeRate", 1.0);
        assert!(matches!(
            engine.prepare(&entity, vec![no_key]),
            Err(SyncError::ConstraintViolation(_))
        ));

        let no_rate = quotation(10, 1.0).with("exchangeRate", Value::Null);
        assert!(matches!(
            engine.prepare(&entity, vec![no_rate]),
            Err(SyncError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_cross_run_duplicate_append_vs_skip_existing() {
        let entity = catalog::quotations();
        let mut wh = warehouse(&entity);
        LoadEngine::default()
            .append(&mut wh, &entity, vec![quotation(10, 1.0)])
            .unwrap();

        let again = vec![quotation(10, 9.0), quotation(11, 2.0)];
        let err = LoadEngine::default()
            .append(&mut wh, &entity, again.clone())
            .unwrap_err();
        assert!(matches!(err, SyncError::ConstraintViolation(_)));
        assert_eq!(wh.count_rows(&entity.name).unwrap(), 1);

        let committed = LoadEngine::new(1000, true).append(&mut wh, &entity, again).unwrap();
        assert_eq!(committed, 1);
        assert_eq!(wh.count_rows(&entity.name).unwrap(), 2);
    }

    #[test]
    fn test_replace_requires_empty_table() {
        let entity = catalog::quotations();
        let mut wh = warehouse(&entity);
        let engine = LoadEngine::default();
        assert_eq!(engine.replace(&mut wh, &entity, vec![quotation(10, 1.0)]).unwrap(), 1);
        assert!(matches!(
            engine.replace(&mut wh, &entity, vec![quotation(11, 1.0)]),
            Err(SyncError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_partially_supplied_default_is_filled() {
        let entity = catalog::quotations();
        let mut wh = warehouse(&entity);
        let records = vec![
            quotation(10, 1.0).with("source", "MANUAL"),
            quotation(11, 2.0),
        ];
        assert_eq!(LoadEngine::default().append(&mut wh, &entity, records).unwrap(), 2);
        let sources: Vec<Value> = wh
            .scan(&entity)
            .unwrap()
            .iter()
            .map(|r| r.value("source").clone())
            .collect();
        assert!(sources.contains(&Value::Text("MANUAL".into())));
        assert!(sources.contains(&Value::Text("BCRA".into())));
    }

    #[test]
    fn test_empty_input_loads_nothing() {
        let entity = catalog::quotations();
        let mut wh = warehouse(&entity);
        assert_eq!(LoadEngine::default().append(&mut wh, &entity, Vec::new()).unwrap(), 0);
    }
}
