//! Watermark tracking
//!
//! The watermark is never stored on its own; it is read live from the
//! destination as `MAX(temporal key)`.

use crate::error::{Result, SyncError};
use crate::schema::Entity;
use crate::warehouse::{Value, Warehouse};
use chrono::NaiveDate;
use tracing::debug;

pub struct WatermarkTracker;

impl WatermarkTracker {
    /// Highest committed value of `key_column`; `None` when the table is empty.
    pub fn high_watermark(
        warehouse: &dyn Warehouse,
        entity: &Entity,
        key_column: &str,
    ) -> Result<Option<Value>> {
        let column = entity.get_column(key_column).ok_or_else(|| {
            SyncError::Schema(format!("{} has no column '{}'", entity.name, key_column))
        })?;
        let watermark = warehouse.max_value(&entity.name, key_column, column.kind)?;
        debug!(entity = %entity.name, column = key_column, watermark = ?watermark, "watermark read");
        Ok(watermark)
    }

    /// First date still to extract: the day after the watermark, or `epoch`
    /// when nothing has been loaded.
    pub fn resume_date(watermark: Option<&Value>, epoch: NaiveDate) -> Result<NaiveDate> {
        match watermark {
            None => Ok(epoch),
            Some(value) => value
                .successor()
                .and_then(|next| next.as_date())
                .ok_or_else(|| {
                    SyncError::Schema(format!("watermark {} is not a date", value))
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_resume_from_epoch_when_empty() {
        assert_eq!(
            WatermarkTracker::resume_date(None, date(2002, 1, 1)).unwrap(),
            date(2002, 1, 1)
        );
    }

    #[test]
    fn test_resume_is_exclusive_of_watermark() {
        let mark = Value::Date(date(2024, 6, 12));
        assert_eq!(
            WatermarkTracker::resume_date(Some(&mark), date(2002, 1, 1)).unwrap(),
            date(2024, 6, 13)
        );
    }

    #[test]
    fn test_non_date_watermark_is_rejected() {
        let mark = Value::Int(5);
        assert!(WatermarkTracker::resume_date(Some(&mark), date(2002, 1, 1)).is_err());
    }
}
