//! Warehouse Module - the seam between the sync engine and a SQL store
//!
//! Both the origin store and the analytical destination are reached through
//! the `Warehouse` trait. Calls are blocking; each mutating call runs in its
//! own transaction.

pub mod dialect;
pub mod postgres;
pub mod sqlite;
pub mod value;

pub use dialect::SqlDialect;
pub use postgres::PgWarehouse;
pub use sqlite::SqliteWarehouse;
pub use value::{parse_date, round_to, Record, Value};

use crate::error::Result;
use crate::schema::{ColumnDef, Entity, SemanticType};

pub trait Warehouse {
    fn dialect(&self) -> SqlDialect;

    /// Run the statements in one transaction.
    fn execute_batch(&mut self, statements: &[String]) -> Result<()>;

    /// `MAX(column)` decoded as `kind`; `None` when the table is empty.
    fn max_value(&self, table: &str, column: &str, kind: SemanticType) -> Result<Option<Value>>;

    fn count_rows(&self, table: &str) -> Result<u64>;

    /// Full-table read of every column the entity declares.
    fn scan(&self, entity: &Entity) -> Result<Vec<Record>>;

    /// Insert `records` (restricted to `columns`) in one transaction and
    /// return how many rows were written. With `skip_conflicts`, rows that hit
    /// an existing key are ignored instead of failing the batch.
    fn insert_rows(
        &mut self,
        entity: &Entity,
        columns: &[&ColumnDef],
        records: &[Record],
        skip_conflicts: bool,
    ) -> Result<u64>;
}

/// `INSERT INTO t (cols) ` prefix shared by both backends
pub(crate) fn insert_prefix(dialect: SqlDialect, entity: &Entity, columns: &[&ColumnDef]) -> String {
    let names: Vec<String> = columns.iter().map(|c| dialect.quote(&c.name)).collect();
    format!(
        "INSERT INTO {} ({}) ",
        dialect.quote(&entity.name),
        names.join(", ")
    )
}
