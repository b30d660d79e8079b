//! PostgreSQL-backed warehouse using sqlx
//!
//! sqlx is async; the warehouse owns a current-thread tokio runtime and
//! drives every call to completion with `block_on`, so callers see plain
//! blocking calls.

use super::{insert_prefix, Record, SqlDialect, Value, Warehouse};
use crate::config::DatabaseConfig;
use crate::error::{Result, SyncError};
use crate::schema::{ColumnDef, Entity, SemanticType};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Postgres caps bind parameters per statement
const MAX_BIND_PARAMS: usize = 65_535;

pub struct PgWarehouse {
    pool: PgPool,
    runtime: Runtime,
}

/// Credentials are passed as discrete fields, never spliced into a URL.
fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.db_name)
}

/// Initialize the database connection pool
async fn init_pool(options: PgConnectOptions) -> std::result::Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    // Test the connection
    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}

impl PgWarehouse {
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let pool = runtime.block_on(init_pool(connect_options(config))).map_err(|e| {
            SyncError::Connection(format!(
                "Failed to connect to {}:{}/{}: {}",
                config.host, config.port, config.db_name, e
            ))
        })?;
        info!(host = %config.host, db = %config.db_name, "connected to postgres");
        Ok(Self { pool, runtime })
    }

    /// Close the pool, waiting for connections to be released.
    pub fn close(self) {
        self.runtime.block_on(self.pool.close());
    }
}

/// Select expression that decodes cleanly into the Rust type for `kind`.
fn decode_expr(kind: SemanticType, expr: &str) -> String {
    match kind {
        SemanticType::Integer => format!("({})::bigint", expr),
        SemanticType::Numeric { .. } => format!("({})::float8", expr),
        SemanticType::Text { .. } => format!("({})::text", expr),
        SemanticType::Date => format!("({})::date", expr),
        SemanticType::Timestamp => format!("({})::timestamptz", expr),
    }
}

fn decode(row: &PgRow, index: usize, kind: SemanticType) -> std::result::Result<Value, sqlx::Error> {
    let value = match kind {
        SemanticType::Integer => row.try_get::<Option<i64>, _>(index)?.map(Value::Int),
        SemanticType::Numeric { .. } => row.try_get::<Option<f64>, _>(index)?.map(Value::Numeric),
        SemanticType::Text { .. } => row.try_get::<Option<String>, _>(index)?.map(Value::Text),
        SemanticType::Date => row.try_get::<Option<NaiveDate>, _>(index)?.map(Value::Date),
        SemanticType::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(Value::Timestamp),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn bind_value(b: &mut Separated<'_, '_, Postgres, &'static str>, kind: SemanticType, value: &Value) {
    match value {
        Value::Int(v) => {
            b.push_bind(*v);
        }
        Value::Numeric(v) => {
            b.push_bind(*v);
        }
        Value::Text(v) => {
            b.push_bind(v.clone());
        }
        Value::Date(v) => {
            b.push_bind(*v);
        }
        Value::Timestamp(v) => {
            b.push_bind(*v);
        }
        // typed NULLs so the server does not have to guess
        Value::Null => match kind {
            SemanticType::Integer => {
                b.push_bind(None::<i64>);
            }
            SemanticType::Numeric { .. } => {
                b.push_bind(None::<f64>);
            }
            SemanticType::Text { .. } => {
                b.push_bind(None::<String>);
            }
            SemanticType::Date => {
                b.push_bind(None::<NaiveDate>);
            }
            SemanticType::Timestamp => {
                b.push_bind(None::<DateTime<Utc>>);
            }
        },
    }
}

fn with_table(table: &str, err: sqlx::Error) -> SyncError {
    match SyncError::from(err) {
        SyncError::ConstraintViolation(msg) => {
            SyncError::ConstraintViolation(format!("{}: {}", table, msg))
        }
        SyncError::Database(msg) => SyncError::Database(format!("{}: {}", table, msg)),
        other => other,
    }
}

impl Warehouse for PgWarehouse {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    fn execute_batch(&mut self, statements: &[String]) -> Result<()> {
        let pool = &self.pool;
        self.runtime.block_on(async move {
            let mut tx = pool.begin().await?;
            for statement in statements {
                debug!(statement = %statement, "postgres execute");
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            tx.commit().await?;
            Ok::<(), SyncError>(())
        })
    }

    fn max_value(&self, table: &str, column: &str, kind: SemanticType) -> Result<Option<Value>> {
        let dialect = self.dialect();
        let sql = format!(
            "SELECT {} FROM {}",
            decode_expr(kind, &format!("MAX({})", dialect.quote(column))),
            dialect.quote(table)
        );
        let row = self
            .runtime
            .block_on(sqlx::query(&sql).fetch_one(&self.pool))
            .map_err(|e| with_table(table, e))?;
        match decode(&row, 0, kind).map_err(|e| with_table(table, e))? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    fn count_rows(&self, table: &str) -> Result<u64> {
        let sql = self.dialect().count_rows(table);
        let count: i64 = self
            .runtime
            .block_on(sqlx::query_scalar::<_, i64>(&sql).fetch_one(&self.pool))
            .map_err(|e| with_table(table, e))?;
        Ok(count.max(0) as u64)
    }

    fn scan(&self, entity: &Entity) -> Result<Vec<Record>> {
        let dialect = self.dialect();
        let columns: Vec<String> = entity
            .columns
            .iter()
            .map(|c| {
                format!(
                    "{} AS {}",
                    decode_expr(c.kind, &dialect.quote(&c.name)),
                    dialect.quote(&c.name)
                )
            })
            .collect();
        let sql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            dialect.quote(&entity.name)
        );

        let rows = self
            .runtime
            .block_on(sqlx::query(&sql).fetch_all(&self.pool))
            .map_err(|e| with_table(&entity.name, e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = Record::new();
            for (i, column) in entity.columns.iter().enumerate() {
                let value = decode(row, i, column.kind).map_err(|e| with_table(&entity.name, e))?;
                record.set(column.name.clone(), value);
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
        if records.is_empty() || columns.is_empty() {
            return Ok(0);
        }

        let prefix = insert_prefix(SqlDialect::Postgres, entity, columns);
        let rows_per_statement = (MAX_BIND_PARAMS / columns.len()).max(1);
        let pool = &self.pool;

        self.runtime
            .block_on(async move {
                let mut tx = pool.begin().await?;
                let mut written = 0u64;
                for chunk in records.chunks(rows_per_statement) {
                    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(prefix.as_str());
                    qb.push_values(chunk, |mut b, record| {
                        for column in columns {
                            bind_value(&mut b, column.kind, record.value(&column.name));
                        }
                    });
                    if skip_conflicts {
                        qb.push(" ON CONFLICT DO NOTHING");
                    }
                    written += qb.build().execute(&mut *tx).await?.rows_affected();
                }
                tx.commit().await?;
                Ok::<u64, sqlx::Error>(written)
            })
            .map_err(|e| with_table(&entity.name, e))
    }
}
