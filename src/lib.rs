//! Warehouse synchronization engine
//!
//! Moves tabular data from an origin store, an exchange-rate API and a
//! listings site into one analytical destination: dependency-ordered schema
//! replication, watermark-based incremental extraction, bounded pagination
//! and key-deduplicated loading.

pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod orchestrator;
pub mod schema;
pub mod warehouse;
pub mod watermark;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use load::{LoadEngine, LoadMode};
pub use orchestrator::{RunResult, RunStatus, UnitOutcome, UnitReport};
pub use schema::{Entity, SchemaCatalog, SchemaReplicator};
pub use warehouse::{PgWarehouse, Record, SqliteWarehouse, Value, Warehouse};
pub use watermark::WatermarkTracker;
