//! SQL rendering for the supported backends

use crate::schema::{ColumnDef, ColumnDefault, Entity, SemanticType};
use itertools::Itertools;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres,
    Sqlite,
}

impl SqlDialect {
    pub fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    pub fn type_name(&self, kind: SemanticType) -> String {
        match (self, kind) {
            (_, SemanticType::Integer) => "INT".to_string(),
            (SqlDialect::Postgres, SemanticType::Text { max_len: Some(n) }) => {
                format!("VARCHAR({})", n)
            }
            (_, SemanticType::Text { .. }) => "TEXT".to_string(),
            (_, SemanticType::Numeric { precision, scale }) => {
                format!("NUMERIC({}, {})", precision, scale)
            }
            (SqlDialect::Postgres, SemanticType::Date) => "DATE".to_string(),
            (SqlDialect::Postgres, SemanticType::Timestamp) => {
                "TIMESTAMP WITH TIME ZONE".to_string()
            }
            // ISO-8601 text keeps ordering and MAX() meaningful
            (SqlDialect::Sqlite, SemanticType::Date | SemanticType::Timestamp) => {
                "TEXT".to_string()
            }
        }
    }

    fn default_clause(&self, default: &ColumnDefault) -> String {
        match default {
            ColumnDefault::Literal(v) => format!("'{}'", v.replace('\'', "''")),
            ColumnDefault::CurrentDate => "CURRENT_DATE".to_string(),
            ColumnDefault::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        }
    }

    fn column_clause(&self, entity: &Entity, column: &ColumnDef) -> String {
        let mut clause = format!("{} {}", self.quote(&column.name), self.type_name(column.kind));
        let single_pk = entity.primary_key.len() == 1 && entity.primary_key[0] == column.name;
        if single_pk {
            clause.push_str(" PRIMARY KEY");
        } else if !column.nullable {
            clause.push_str(" NOT NULL");
        }
        if column.unique && !single_pk {
            clause.push_str(" UNIQUE");
        }
        if let Some(default) = &column.default {
            clause.push_str(" DEFAULT ");
            clause.push_str(&self.default_clause(default));
        }
        clause
    }

    /// `CREATE TABLE IF NOT EXISTS` with inline keys and constraints
    pub fn create_table(&self, entity: &Entity) -> String {
        let mut parts: Vec<String> = entity
            .columns
            .iter()
            .map(|c| self.column_clause(entity, c))
            .collect();

        if entity.primary_key.len() > 1 {
            parts.push(format!(
                "PRIMARY KEY ({})",
                entity.primary_key.iter().map(|c| self.quote(c)).join(", ")
            ));
        }
        for fk in &entity.foreign_keys {
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                self.quote(&fk.column),
                self.quote(&fk.entity),
                self.quote(&fk.referenced_column)
            ));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.quote(&entity.name),
            parts.join(",\n    ")
        )
    }

    /// `DROP TABLE IF EXISTS`, cascading where the backend supports it
    pub fn drop_table(&self, entity: &Entity) -> String {
        match self {
            SqlDialect::Postgres => {
                format!("DROP TABLE IF EXISTS {} CASCADE", self.quote(&entity.name))
            }
            SqlDialect::Sqlite => format!("DROP TABLE IF EXISTS {}", self.quote(&entity.name)),
        }
    }

    pub fn select_max(&self, table: &str, column: &str) -> String {
        format!(
            "SELECT MAX({}) FROM {}",
            self.quote(column),
            self.quote(table)
        )
    }

    pub fn count_rows(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", self.quote(table))
    }
}
