//! Built-in catalogs: the sales star schema and the two single-table
//! external-source schemas.

use super::{ColumnDef, ColumnDefault, Derivation, Entity, SchemaCatalog, SemanticType};
use crate::error::Result;

pub const DIM_DATE: &str = "dim_date";
pub const DIM_CUSTOMER_SEGMENT: &str = "dim_customer_segment";
pub const DIM_PRODUCT: &str = "dim_product";
pub const FACT_SALES: &str = "fact_sales";
pub const QUOTATIONS: &str = "quotations";
pub const LISTINGS: &str = "listings";

fn int(name: &str) -> ColumnDef {
    ColumnDef::new(name, SemanticType::Integer)
}

fn varchar(name: &str, len: u32) -> ColumnDef {
    ColumnDef::new(name, SemanticType::Text { max_len: Some(len) })
}

fn text(name: &str) -> ColumnDef {
    ColumnDef::new(name, SemanticType::Text { max_len: None })
}

fn numeric(name: &str, precision: u8, scale: u8) -> ColumnDef {
    ColumnDef::new(name, SemanticType::Numeric { precision, scale })
}

pub fn dim_date() -> Entity {
    Entity::new(DIM_DATE)
        .column(int("dateid"))
        .column(ColumnDef::new("date", SemanticType::Date).not_null().unique())
        .column(int("year"))
        .column(int("quarter"))
        .column(varchar("quarterName", 20))
        .column(int("month"))
        .column(varchar("monthName", 20))
        .column(int("day"))
        .column(int("weekday"))
        .column(varchar("weekdayName", 15))
        .primary_key(&["dateid"])
        .source_file("DimDate.csv")
}

pub fn dim_customer_segment() -> Entity {
    Entity::new(DIM_CUSTOMER_SEGMENT)
        .column(int("segmentId"))
        .column(varchar("city", 100).not_null())
        .primary_key(&["segmentId"])
        .source_file("DimCustomerSegment.csv")
}

pub fn dim_product() -> Entity {
    Entity::new(DIM_PRODUCT)
        .column(int("productId"))
        .column(varchar("productType", 255).not_null())
        .primary_key(&["productId"])
        .source_file("DimProduct.csv")
}

pub fn fact_sales() -> Entity {
    Entity::new(FACT_SALES)
        .column(varchar("salesId", 50))
        .column(int("dateId").not_null())
        .column(int("productId").not_null())
        .column(int("segmentId").not_null())
        .column(numeric("pricePerUnit", 10, 2).not_null())
        .column(int("quantitySold").not_null())
        .column(
            numeric("totalAmount", 10, 2)
                .derived(Derivation::Product("pricePerUnit".into(), "quantitySold".into())),
        )
        .primary_key(&["salesId"])
        .references("dateId", DIM_DATE, "dateid")
        .references("productId", DIM_PRODUCT, "productId")
        .references("segmentId", DIM_CUSTOMER_SEGMENT, "segmentId")
        .source_file("FactSales.csv")
}

pub fn quotations() -> Entity {
    Entity::new(QUOTATIONS)
        .column(ColumnDef::new("date", SemanticType::Date))
        .column(text("currencyCode").not_null())
        .column(numeric("exchangeRate", 10, 4).not_null())
        .column(
            text("source")
                .not_null()
                .default_to(ColumnDefault::Literal("BCRA".into())),
        )
        .column(
            ColumnDef::new("createdAt", SemanticType::Timestamp)
                .default_to(ColumnDefault::CurrentTimestamp),
        )
        .column(
            ColumnDef::new("updatedAt", SemanticType::Timestamp)
                .default_to(ColumnDefault::CurrentTimestamp),
        )
        .primary_key(&["date"])
        .temporal_key("date")
}

pub fn listings() -> Entity {
    Entity::new(LISTINGS)
        .column(varchar("listingId", 255))
        .column(text("title"))
        .column(text("location"))
        .column(varchar("priceCurrency", 10))
        .column(numeric("priceValue", 15, 2))
        .column(numeric("landAreaM2", 10, 2))
        .column(numeric("frontageM", 10, 2))
        .column(numeric("depthM", 10, 2))
        .column(text("listingUrl").unique())
        .column(numeric("latitude", 10, 7))
        .column(numeric("longitude", 10, 7))
        .column(text("description"))
        .column(ColumnDef::new("scrapeDate", SemanticType::Date).default_to(ColumnDefault::CurrentDate))
        .primary_key(&["listingId"])
        .temporal_key("scrapeDate")
}

impl SchemaCatalog {
    /// Sales star schema: three dimensions and one fact
    pub fn star_schema() -> Result<Self> {
        SchemaCatalog::new(vec![
            dim_date(),
            dim_customer_segment(),
            dim_product(),
            fact_sales(),
        ])
    }

    pub fn quotations() -> Result<Self> {
        SchemaCatalog::new(vec![quotations()])
    }

    pub fn listings() -> Result<Self> {
        SchemaCatalog::new(vec![listings()])
    }
}
