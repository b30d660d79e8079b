//! Typed cell values and canonical rows

use crate::error::{Result, SyncError};
use crate::schema::SemanticType;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One typed cell
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Numeric(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    /// Parse a raw text cell into `kind`. Empty input becomes `Null`.
    pub fn coerce(kind: SemanticType, raw: &str) -> Result<Value> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }

        match kind {
            SemanticType::Integer => {
                if let Ok(i) = trimmed.parse::<i64>() {
                    return Ok(Value::Int(i));
                }
                // "12.0" as written by spreadsheet exports
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(whole_to_i64)
                    .map(Value::Int)
                    .ok_or_else(|| SyncError::Parse(format!("'{}' is not an integer", trimmed)))
            }
            SemanticType::Numeric { scale, .. } => trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| Value::Numeric(round_to(f, scale)))
                .ok_or_else(|| SyncError::Parse(format!("'{}' is not numeric", trimmed))),
            SemanticType::Text { .. } => Ok(Value::Text(trimmed.to_string())),
            SemanticType::Date => parse_date(trimmed).map(Value::Date),
            SemanticType::Timestamp => parse_timestamp(trimmed).map(Value::Timestamp),
        }
    }

    /// Coerce a JSON scalar (number or string) into `kind`.
    pub fn coerce_json(kind: SemanticType, raw: &serde_json::Value) -> Result<Value> {
        match raw {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::String(s) => Value::coerce(kind, s),
            serde_json::Value::Number(n) => Value::coerce(kind, &n.to_string()),
            serde_json::Value::Bool(b) => Value::coerce(kind, &b.to_string()),
            other => Err(SyncError::Parse(format!("unexpected JSON value: {}", other))),
        }
    }

    /// Bring an already-typed value in line with a column type.
    pub fn conform(self, kind: SemanticType) -> Result<Value> {
        match (kind, self) {
            (_, Value::Null) => Ok(Value::Null),
            (SemanticType::Integer, Value::Int(v)) => Ok(Value::Int(v)),
            (SemanticType::Integer, Value::Numeric(f)) if whole_to_i64(f).is_some() => {
                Ok(Value::Int(f as i64))
            }
            (SemanticType::Numeric { scale, .. }, Value::Int(v)) => {
                Ok(Value::Numeric(round_to(v as f64, scale)))
            }
            (SemanticType::Numeric { scale, .. }, Value::Numeric(f)) => {
                Ok(Value::Numeric(round_to(f, scale)))
            }
            (SemanticType::Text { .. }, Value::Text(s)) => Ok(Value::Text(s)),
            (SemanticType::Text { .. }, other) => Ok(Value::Text(other.to_string())),
            (SemanticType::Date, Value::Date(d)) => Ok(Value::Date(d)),
            (SemanticType::Date, Value::Timestamp(ts)) => Ok(Value::Date(ts.date_naive())),
            (SemanticType::Timestamp, Value::Timestamp(ts)) => Ok(Value::Timestamp(ts)),
            (kind, Value::Text(s)) => Value::coerce(kind, &s),
            (kind, other) => Err(SyncError::Parse(format!(
                "{} does not fit a {:?} column",
                other, kind
            ))),
        }
    }

    /// The smallest value strictly greater than this one, for exclusive lower bounds.
    pub fn successor(&self) -> Option<Value> {
        match self {
            Value::Int(v) => v.checked_add(1).map(Value::Int),
            Value::Date(d) => d.checked_add_signed(Duration::days(1)).map(Value::Date),
            _ => None,
        }
    }

    /// Stable text form used to compare primary keys.
    pub fn key_fragment(&self) -> String {
        match self {
            Value::Null => "\u{0}".to_string(),
            Value::Numeric(f) => format!("{:?}", f),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Numeric(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Numeric(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Whole floats inside the `i64` range; `None` instead of saturating.
fn whole_to_i64(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

pub fn round_to(value: f64, scale: u8) -> f64 {
    let factor = 10f64.powi(scale as i32);
    (value * factor).round() / factor
}

/// Accepts ISO dates and ISO timestamps (date part kept).
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .map_err(|e| SyncError::Parse(format!("'{}' is not a date: {}", raw, e)))
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` read as UTC (SQLite's CURRENT_TIMESTAMP).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ts| ts.and_utc())
        })
        .map_err(|e| SyncError::Parse(format!("'{}' is not a timestamp: {}", raw, e)))
}

/// A normalized row destined for one entity, keyed by column name
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Missing columns read as `Null`.
    pub fn value(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&Value::Null)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: SemanticType = SemanticType::Numeric {
        precision: 10,
        scale: 4,
    };

    #[test]
    fn test_coerce_numeric_rounds_to_scale() {
        assert_eq!(
            Value::coerce(RATE, " 912.123456 ").unwrap(),
            Value::Numeric(912.1235)
        );
        assert!(matches!(
            Value::coerce(RATE, "n/a"),
            Err(SyncError::Parse(_))
        ));
        assert_eq!(Value::coerce(RATE, "").unwrap(), Value::Null);
    }

    #[test]
    fn test_coerce_integer_accepts_whole_floats() {
        assert_eq!(
            Value::coerce(SemanticType::Integer, "42.0").unwrap(),
            Value::Int(42)
        );
        assert!(Value::coerce(SemanticType::Integer, "4.5").is_err());
    }

    #[test]
    fn test_coerce_json_number_and_string() {
        let number = serde_json::json!(1050.5);
        let text = serde_json::json!("1050.5");
        assert_eq!(Value::coerce_json(RATE, &number).unwrap(), Value::Numeric(1050.5));
        assert_eq!(Value::coerce_json(RATE, &text).unwrap(), Value::Numeric(1050.5));
    }

    #[test]
    fn test_date_parsing_and_successor() {
        let d = Value::coerce(SemanticType::Date, "2024-06-12T00:00:00").unwrap();
        assert_eq!(d, Value::Date(NaiveDate::from_ymd_opt(2024, 6, 12).unwrap()));
        assert_eq!(
            d.successor(),
            Some(Value::Date(NaiveDate::from_ymd_opt(2024, 6, 13).unwrap()))
        );
        assert_eq!(Value::Int(7).successor(), Some(Value::Int(8)));
        assert_eq!(Value::Text("x".into()).successor(), None);
    }

    #[test]
    fn test_record_missing_column_reads_null() {
        let record = Record::new().with("salesId", "S1").with("quantitySold", 3i64);
        assert_eq!(record.value("salesId"), &Value::Text("S1".into()));
        assert!(record.value("absent").is_null());
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_out_of_range_integers_are_rejected() {
        assert_eq!(
            Value::coerce(SemanticType::Integer, "12.0").unwrap(),
            Value::Int(12)
        );
        assert!(matches!(
            Value::coerce(SemanticType::Integer, "1e30"),
            Err(SyncError::Parse(_))
        ));
        assert!(matches!(
            Value::coerce(SemanticType::Integer, "-1e30"),
            Err(SyncError::Parse(_))
        ));
        assert!(matches!(
            Value::Numeric(1e30).conform(SemanticType::Integer),
            Err(SyncError::Parse(_))
        ));
        assert_eq!(
            Value::Numeric(42.0).conform(SemanticType::Integer).unwrap(),
            Value::Int(42)
        );
    }
}
