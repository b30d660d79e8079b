//! SQLite-backed warehouse (embedded, FK enforcement on)

use super::{insert_prefix, Record, SqlDialect, Value, Warehouse};
use crate::error::{Result, SyncError};
use crate::schema::{ColumnDef, Entity, SemanticType};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use tracing::debug;

pub struct SqliteWarehouse {
    conn: Connection,
}

impl SqliteWarehouse {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            SyncError::Connection(format!(
                "Failed to open {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncError::Connection(format!("Failed to open in-memory db: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        // FK enforcement is off by default in SQLite
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Raw connection, for ad-hoc assertions
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int(v) => SqlValue::Integer(*v),
        Value::Numeric(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Date(_) | Value::Timestamp(_) => SqlValue::Text(value.to_string()),
    }
}

fn from_sql(kind: SemanticType, raw: SqlValue) -> Result<Value> {
    match raw {
        SqlValue::Null => Ok(Value::Null),
        SqlValue::Integer(i) => Value::Int(i).conform(kind),
        SqlValue::Real(f) => Value::Numeric(f).conform(kind),
        SqlValue::Text(s) => Value::coerce(kind, &s),
        SqlValue::Blob(_) => Err(SyncError::Database(
            "BLOB values are not supported".to_string(),
        )),
    }
}

fn with_table(table: &str, err: rusqlite::Error) -> SyncError {
    match SyncError::from(err) {
        SyncError::ConstraintViolation(msg) => {
            SyncError::ConstraintViolation(format!("{}: {}", table, msg))
        }
        SyncError::Database(msg) => SyncError::Database(format!("{}: {}", table, msg)),
        other => other,
    }
}

impl Warehouse for SqliteWarehouse {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn execute_batch(&mut self, statements: &[String]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for statement in statements {
            debug!(statement = %statement, "sqlite execute");
            tx.execute_batch(statement)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn max_value(&self, table: &str, column: &str, kind: SemanticType) -> Result<Option<Value>> {
        let sql = self.dialect().select_max(table, column);
        let raw: SqlValue = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| with_table(table, e))?;
        match from_sql(kind, raw)? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    fn count_rows(&self, table: &str) -> Result<u64> {
        let sql = self.dialect().count_rows(table);
        let count: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| with_table(table, e))?;
        Ok(count.max(0) as u64)
    }

    fn scan(&self, entity: &Entity) -> Result<Vec<Record>> {
        let dialect = self.dialect();
        let columns: Vec<String> = entity.columns.iter().map(|c| dialect.quote(&c.name)).collect();
        let sql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            dialect.quote(&entity.name)
        );

        let mut stmt = self.conn.prepare(&sql).map_err(|e| with_table(&entity.name, e))?;
        let rows = stmt
            .query_map([], |row| {
                (0..entity.columns.len())
                    .map(|i| row.get::<_, SqlValue>(i))
                    .collect::<rusqlite::Result<Vec<SqlValue>>>()
            })
            .map_err(|e| with_table(&entity.name, e))?;

        let mut records = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| with_table(&entity.name, e))?;
            let mut record = Record::new();
            for (column, cell) in entity.columns.iter().zip(raw) {
                record.set(column.name.clone(), from_sql(column.kind, cell)?);
            }
            records.push(record);
        }
        Ok(records)
    }

    fn insert_rows(
        &mut self,
        entity: &Entity,
        columns: &[&ColumnDef],
        records: &[Record],
        skip_conflicts: bool,
    ) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let mut sql = format!(
            "{}VALUES ({})",
            insert_prefix(SqlDialect::Sqlite, entity, columns),
            placeholders
        );
        if skip_conflicts {
            sql.push_str(" ON CONFLICT DO NOTHING");
        }

        let tx = self.conn.transaction()?;
        let mut written = 0u64;
        {
            let mut stmt = tx.prepare(&sql).map_err(|e| with_table(&entity.name, e))?;
            for record in records {
                let params = columns.iter().map(|c| to_sql(record.value(&c.name)));
                written += stmt
                    .execute(params_from_iter(params))
                    .map_err(|e| with_table(&entity.name, e))? as u64;
            }
        }
        tx.commit()?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::catalog;
    use chrono::NaiveDate;

    fn quotation(day: u32, rate: f64) -> Record {
        Record::new()
            .with("date", NaiveDate::from_ymd_opt(2024, 6, day).unwrap())
            .with("currencyCode", "USD")
            .with("exchangeRate", rate)
            .with("source", "BCRA")
    }

    fn warehouse_with(entity: &Entity) -> SqliteWarehouse {
        let mut wh = SqliteWarehouse::in_memory().unwrap();
        wh.execute_batch(&[SqlDialect::Sqlite.create_table(entity)]).unwrap();
        wh
    }

    #[test]
    fn test_insert_scan_and_max() {
        let entity = catalog::quotations();
        let mut wh = warehouse_with(&entity);
        let records = vec![quotation(10, 900.5), quotation(12, 901.25)];
        let columns = entity.insert_columns(&records);

        assert_eq!(wh.insert_rows(&entity, &columns, &records, false).unwrap(), 2);
        assert_eq!(wh.count_rows("quotations").unwrap(), 2);
        assert_eq!(
            wh.max_value("quotations", "date", SemanticType::Date).unwrap(),
            Some(Value::Date(NaiveDate::from_ymd_opt(2024, 6, 12).unwrap()))
        );

        let scanned = wh.scan(&entity).unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].value("exchangeRate"), &Value::Numeric(900.5));
        // server default filled in
        assert!(!scanned[0].value("createdAt").is_null());
    }

    #[test]
    fn test_duplicate_key_is_constraint_violation() {
        let entity = catalog::quotations();
        let mut wh = warehouse_with(&entity);
        let first = vec![quotation(10, 900.5)];
        let columns = entity.insert_columns(&first);
        wh.insert_rows(&entity, &columns, &first, false).unwrap();

        let err = wh.insert_rows(&entity, &columns, &first, false).unwrap_err();
        assert!(matches!(err, SyncError::ConstraintViolation(_)));
        assert_eq!(wh.insert_rows(&entity, &columns, &first, true).unwrap(), 0);
        assert_eq!(wh.count_rows("quotations").unwrap(), 1);
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let entity = catalog::quotations();
        let mut wh = warehouse_with(&entity);
        let batch = vec![quotation(10, 1.0), quotation(11, 2.0), quotation(10, 3.0)];
        let columns = entity.insert_columns(&batch);

        assert!(wh.insert_rows(&entity, &columns, &batch, false).is_err());
        assert_eq!(wh.count_rows("quotations").unwrap(), 0);
    }

    #[test]
    fn test_max_of_empty_table_is_none() {
        let entity = catalog::quotations();
        let wh = warehouse_with(&entity);
        assert_eq!(
            wh.max_value("quotations", "date", SemanticType::Date).unwrap(),
            None
        );
    }
}
