#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate};
use warehouse_sync::error::{Result, SyncError};
use warehouse_sync::extract::api::{RawDetail, RawQuotation};
use warehouse_sync::extract::{ApiPage, ApiTransport, PageRequest};
use warehouse_sync::schema::catalog;
use warehouse_sync::{LoadEngine, Record, SchemaCatalog, SchemaReplicator, SqliteWarehouse};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// API fake that answers from a closure and remembers every request.
pub struct FakeApi<F>
where
    F: FnMut(&PageRequest) -> Result<ApiPage>,
{
    respond: F,
    pub requests: Vec<PageRequest>,
}

impl<F> FakeApi<F>
where
    F: FnMut(&PageRequest) -> Result<ApiPage>,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            requests: Vec::new(),
        }
    }
}

impl<F> ApiTransport for FakeApi<F>
where
    F: FnMut(&PageRequest) -> Result<ApiPage>,
{
    fn fetch_page(&mut self, request: &PageRequest) -> Result<ApiPage> {
        self.requests.push(*request);
        (self.respond)(request)
    }
}

pub fn raw_quotation(day: NaiveDate, code: &str, rate: serde_json::Value) -> RawQuotation {
    RawQuotation {
        date: serde_json::json!(day.format("%Y-%m-%d").to_string()),
        detail: vec![RawDetail {
            code: code.to_string(),
            value: rate,
        }],
    }
}

/// `count` consecutive USD quotations starting at `first`
pub fn quotation_page(first: NaiveDate, count: usize) -> ApiPage {
    ApiPage {
        results: (0..count)
            .map(|i| {
                raw_quotation(
                    first + Duration::days(i as i64),
                    "USD",
                    serde_json::json!(900.0 + i as f64 / 100.0),
                )
            })
            .collect(),
    }
}

pub fn transport_down(request: &PageRequest) -> SyncError {
    SyncError::Extraction(format!("connection reset ({})", request))
}

pub fn dim_date_rows(count: usize) -> Vec<Record> {
    let start = date(2020, 1, 1);
    (0..count)
        .map(|i| {
            let day = start + Duration::days(i as i64);
            Record::new()
                .with("dateid", (i + 1) as i64)
                .with("date", day)
                .with("year", day.year() as i64)
                .with("quarter", ((day.month() - 1) / 3 + 1) as i64)
                .with("quarterName", format!("Q{}", (day.month() - 1) / 3 + 1))
                .with("month", day.month() as i64)
                .with("monthName", day.format("%B").to_string())
                .with("day", day.day() as i64)
                .with("weekday", day.weekday().number_from_monday() as i64)
                .with("weekdayName", day.format("%A").to_string())
        })
        .collect()
}

pub fn segment_rows(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            Record::new()
                .with("segmentId", (i + 1) as i64)
                .with("city", format!("City {}", i + 1))
        })
        .collect()
}

pub fn product_rows(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            Record::new()
                .with("productId", (i + 1) as i64)
                .with("productType", format!("Type {}", i % 7))
        })
        .collect()
}

pub fn fact_rows(count: usize, dates: usize, products: usize, segments: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            Record::new()
                .with("salesId", format!("S{:05}", i + 1))
                .with("dateId", (i % dates + 1) as i64)
                .with("productId", (i % products + 1) as i64)
                .with("segmentId", (i % segments + 1) as i64)
                .with("pricePerUnit", (i % 97) as f64 + 0.99)
                .with("quantitySold", (i % 9 + 1) as i64)
        })
        .collect()
}

/// Origin store holding the star schema with the given row counts.
pub fn seeded_origin(dates: usize, segments: usize, products: usize, facts: usize) -> SqliteWarehouse {
    let catalog = SchemaCatalog::star_schema().unwrap();
    let mut origin = SqliteWarehouse::in_memory().unwrap();
    SchemaReplicator::new(&catalog).create_all(&mut origin).unwrap();

    let loader = LoadEngine::default();
    loader
        .append(&mut origin, &catalog::dim_date(), dim_date_rows(dates))
        .unwrap();
    loader
        .append(&mut origin, &catalog::dim_customer_segment(), segment_rows(segments))
        .unwrap();
    loader
        .append(&mut origin, &catalog::dim_product(), product_rows(products))
        .unwrap();
    loader
        .append(
            &mut origin,
            &catalog::fact_sales(),
            fact_rows(facts, dates, products, segments),
        )
        .unwrap();
    origin
}

pub fn scalar(wh: &SqliteWarehouse, sql: &str) -> i64 {
    wh.connection().query_row(sql, [], |row| row.get(0)).unwrap()
}
