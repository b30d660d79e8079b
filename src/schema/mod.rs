//! Schema Module - typed descriptors for destination tables
//!
//! A single `SchemaCatalog` describes every entity (columns, primary key,
//! foreign keys). Create and drop orders are both derived from it, so they can
//! never drift apart.

pub mod catalog;
pub mod graph;
pub mod replicator;

pub use graph::DependencyGraph;
pub use replicator::SchemaReplicator;

use crate::error::{Result, SyncError};
use crate::warehouse::{round_to, Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Semantic column type, rendered per dialect
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SemanticType {
    Integer,
    Text { max_len: Option<u32> },
    Numeric { precision: u8, scale: u8 },
    Date,
    Timestamp,
}

/// Server-side default for a column
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ColumnDefault {
    Literal(String),
    CurrentDate,
    CurrentTimestamp,
}

/// Formula for a column computed during transform
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Derivation {
    Product(String, String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: SemanticType,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
    pub derived: Option<Derivation>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: SemanticType) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            unique: false,
            default: None,
            derived: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_to(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn derived(mut self, derivation: Derivation) -> Self {
        self.derived = Some(derivation);
        self
    }
}

/// `column` references `entity.referenced_column`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub entity: String,
    pub referenced_column: String,
}

/// A destination table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    /// Column the watermark is read from
    pub temporal_key: Option<String>,
    /// Static export this entity is seeded from, if any
    pub source_file: Option<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            temporal_key: None,
            source_file: None,
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn references(mut self, column: &str, entity: &str, referenced_column: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.to_string(),
            entity: entity.to_string(),
            referenced_column: referenced_column.to_string(),
        });
        self
    }

    pub fn temporal_key(mut self, column: &str) -> Self {
        self.temporal_key = Some(column.to_string());
        self
    }

    pub fn source_file(mut self, file_name: &str) -> Self {
        self.source_file = Some(file_name.to_string());
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Entities this one must be created after
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for fk in &self.foreign_keys {
            if fk.entity != self.name && !deps.contains(&fk.entity) {
                deps.push(fk.entity.clone());
            }
        }
        deps
    }

    /// Primary key of a record as a comparable string; `None` when any part is missing.
    pub fn key_of(&self, record: &Record) -> Option<String> {
        let mut parts = Vec::with_capacity(self.primary_key.len());
        for column in &self.primary_key {
            let value = record.value(column);
            if value.is_null() {
                return None;
            }
            parts.push(value.key_fragment());
        }
        Some(parts.join("\u{1f}"))
    }

    /// Fill derived columns (e.g. totals) and conform every value to its column type.
    pub fn apply_derivations(&self, record: &mut Record) -> Result<()> {
        for column in &self.columns {
            match &column.derived {
                Some(Derivation::Product(a, b)) => {
                    let value = match (record.value(a).as_f64(), record.value(b).as_f64()) {
                        (Some(x), Some(y)) => match column.kind {
                            SemanticType::Numeric { scale, .. } => {
                                Value::Numeric(round_to(x * y, scale))
                            }
                            _ => Value::Numeric(x * y),
                        },
                        _ => Value::Null,
                    };
                    record.set(column.name.clone(), value);
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Conform each known column of `record` to its declared type.
    pub fn conform(&self, record: Record) -> Result<Record> {
        let mut out = Record::new();
        for column in &self.columns {
            if let Some(value) = record.get(&column.name) {
                let value = value.clone().conform(column.kind).map_err(|e| {
                    SyncError::Parse(format!("{}.{}: {}", self.name, column.name, e))
                })?;
                out.set(column.name.clone(), value);
            }
        }
        Ok(out)
    }

    /// Columns sent on insert: everything without a server default, plus
    /// defaulted columns that some record actually supplies.
    pub fn insert_columns(&self, records: &[Record]) -> Vec<&ColumnDef> {
        self.columns
            .iter()
            .filter(|c| {
                c.default.is_none() || records.iter().any(|r| !r.value(&c.name).is_null())
            })
            .collect()
    }
}

/// The full set of entities one pipeline manages
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaCatalog {
    entities: Vec<Entity>,
    forward: Vec<String>,
}

impl SchemaCatalog {
    /// Validate references and compute the dependency order.
    pub fn new(entities: Vec<Entity>) -> Result<Self> {
        let mut names = HashSet::new();
        for entity in &entities {
            if !names.insert(entity.name.clone()) {
                return Err(SyncError::Schema(format!(
                    "entity '{}' declared twice",
                    entity.name
                )));
            }
            if entity.primary_key.is_empty() {
                return Err(SyncError::Schema(format!(
                    "entity '{}' has no primary key",
                    entity.name
                )));
            }
            for key in entity.primary_key.iter().chain(entity.temporal_key.iter()) {
                if entity.get_column(key).is_none() {
                    return Err(SyncError::Schema(format!(
                        "entity '{}' has no column '{}'",
                        entity.name, key
                    )));
                }
            }
        }

        let mut graph = DependencyGraph::new();
        for entity in &entities {
            for fk in &entity.foreign_keys {
                let target = entities.iter().find(|e| e.name == fk.entity).ok_or_else(|| {
                    SyncError::Schema(format!(
                        "{}.{} references unknown entity '{}'",
                        entity.name, fk.column, fk.entity
                    ))
                })?;
                if target.get_column(&fk.referenced_column).is_none() {
                    return Err(SyncError::Schema(format!(
                        "{}.{} references unknown column {}.{}",
                        entity.name, fk.column, fk.entity, fk.referenced_column
                    )));
                }
            }
            graph.add_node(entity.name.clone(), entity.dependencies());
        }
        let forward = graph.topological_sort()?;

        Ok(Self { entities, forward })
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Parents before children
    pub fn forward_order(&self) -> Vec<&Entity> {
        self.forward
            .iter()
            .filter_map(|name| self.entity(name))
            .collect()
    }

    /// Children before parents
    pub fn reverse_order(&self) -> Vec<&Entity> {
        let mut order = self.forward_order();
        order.reverse();
        order
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
