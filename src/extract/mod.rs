//! Extract Module - bounded retrieval from external and origin sources
//!
//! Every source produces canonical `Record`s for one entity. External sources
//! are consumed window by window: a `DateWindow` for calendar ranges, an
//! offset/limit cursor for API pages, a page number for listings.

pub mod api;
pub mod listing_parser;
pub mod listings;
pub mod snapshot;

pub use api::{ApiPage, ApiTransport, HttpApiTransport, PageRequest, QuotationExtractor};
pub use listing_parser::ListingCardParser;
pub use listings::{HttpPageSource, ListingsExtractor, PageParser, PageSource};
pub use snapshot::{CsvSnapshotSource, SnapshotSource, WarehouseSnapshot};

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed calendar range `[from, to]`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    /// `None` when `from` is after `to` (nothing outstanding).
    pub fn new(from: NaiveDate, to: NaiveDate) -> Option<Self> {
        if from > to {
            None
        } else {
            Some(Self { from, to })
        }
    }

    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Split into contiguous year-aligned sub-windows, oldest first.
    pub fn partition_by_year(&self) -> Vec<DateWindow> {
        let mut windows = Vec::new();
        let mut from = self.from;
        while from <= self.to {
            let year_end = NaiveDate::from_ymd_opt(from.year(), 12, 31).unwrap_or(self.to);
            let to = year_end.min(self.to);
            windows.push(DateWindow { from, to });
            match to.checked_add_signed(Duration::days(1)) {
                Some(next) => from = next,
                None => break,
            }
        }
        windows
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            self.from.format("%Y-%m-%d"),
            self.to.format("%Y-%m-%d")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_range() {
        assert!(DateWindow::new(date(2024, 6, 21), date(2024, 6, 20)).is_none());
        let single = DateWindow::new(date(2024, 6, 20), date(2024, 6, 20)).unwrap();
        assert_eq!(single.days(), 1);
        assert_eq!(single.partition_by_year(), vec![single]);
    }

    #[test]
    fn test_partition_within_one_year() {
        let window = DateWindow::new(date(2024, 6, 13), date(2024, 6, 20)).unwrap();
        assert_eq!(window.partition_by_year(), vec![window]);
    }

    #[test]
    fn test_partition_is_year_aligned_cover() {
        let window = DateWindow::new(date(2021, 11, 5), date(2024, 2, 29)).unwrap();
        let parts = window.partition_by_year();
        assert_eq!(
            parts,
            vec![
                DateWindow { from: date(2021, 11, 5), to: date(2021, 12, 31) },
                DateWindow { from: date(2022, 1, 1), to: date(2022, 12, 31) },
                DateWindow { from: date(2023, 1, 1), to: date(2023, 12, 31) },
                DateWindow { from: date(2024, 1, 1), to: date(2024, 2, 29) },
            ]
        );
        let total: i64 = parts.iter().map(DateWindow::days).sum();
        assert_eq!(total, window.days());
    }

    #[test]
    fn test_display() {
        let window = DateWindow::new(date(2024, 6, 13), date(2024, 6, 20)).unwrap();
        assert_eq!(window.to_string(), "[2024-06-13, 2024-06-20]");
    }
}
