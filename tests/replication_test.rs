mod common;

use common::*;
use std::fs;
use warehouse_sync::extract::{CsvSnapshotSource, WarehouseSnapshot};
use warehouse_sync::orchestrator::{OriginSeeder, ReplicationPipeline};
use warehouse_sync::schema::catalog;
use warehouse_sync::{
    LoadEngine, RunStatus, SchemaCatalog, SqliteWarehouse, SyncError, UnitOutcome, Value, Warehouse,
};

fn replicate(origin: &SqliteWarehouse, destination: &mut SqliteWarehouse) -> warehouse_sync::RunResult {
    let catalog = SchemaCatalog::star_schema().unwrap();
    ReplicationPipeline::new(&catalog, LoadEngine::new(500, false))
        .run(&mut WarehouseSnapshot::new(origin), destination)
        .unwrap()
}

#[test]
fn test_full_replication_loads_every_row_and_derives_totals() {
    let origin = seeded_origin(500, 5, 300, 3000);
    let mut destination = SqliteWarehouse::in_memory().unwrap();

    let run = replicate(&origin, &mut destination);

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.outcome("dim_date"), Some(&UnitOutcome::Succeeded(500)));
    assert_eq!(run.outcome("dim_customer_segment"), Some(&UnitOutcome::Succeeded(5)));
    assert_eq!(run.outcome("dim_product"), Some(&UnitOutcome::Succeeded(300)));
    assert_eq!(run.outcome("fact_sales"), Some(&UnitOutcome::Succeeded(3000)));
    assert_eq!(run.records_loaded, 3805);

    for row in destination.scan(&catalog::fact_sales()).unwrap() {
        let price = row.value("pricePerUnit").as_f64().unwrap();
        let quantity = row.value("quantitySold").as_f64().unwrap();
        let total = row.value("totalAmount").as_f64().unwrap();
        assert!((total - price * quantity).abs() < 0.005, "{:?}", row);
    }
}

#[test]
fn test_full_replication_is_idempotent() {
    let origin = seeded_origin(60, 3, 20, 200);
    let mut destination = SqliteWarehouse::in_memory().unwrap();

    let first = replicate(&origin, &mut destination);
    let first_rows = destination.scan(&catalog::fact_sales()).unwrap();
    let second = replicate(&origin, &mut destination);
    let second_rows = destination.scan(&catalog::fact_sales()).unwrap();

    assert_eq!(first.records_loaded, second.records_loaded);
    assert_eq!(first_rows, second_rows);
    for entity in SchemaCatalog::star_schema().unwrap().forward_order() {
        assert_eq!(
            destination.count_rows(&entity.name).unwrap(),
            origin.count_rows(&entity.name).unwrap()
        );
    }
}

#[test]
fn test_keys_unique_and_references_resolve() {
    let origin = seeded_origin(60, 3, 20, 200);
    let mut destination = SqliteWarehouse::in_memory().unwrap();
    replicate(&origin, &mut destination);

    assert_eq!(
        scalar(&destination, "SELECT COUNT(DISTINCT \"salesId\") FROM \"fact_sales\""),
        scalar(&destination, "SELECT COUNT(*) FROM \"fact_sales\"")
    );
    let orphans = scalar(
        &destination,
        "SELECT COUNT(*) FROM \"fact_sales\" f \
         LEFT JOIN \"dim_date\" d ON f.\"dateId\" = d.\"dateid\" \
         LEFT JOIN \"dim_product\" p ON f.\"productId\" = p.\"productId\" \
         LEFT JOIN \"dim_customer_segment\" s ON f.\"segmentId\" = s.\"segmentId\" \
         WHERE d.\"dateid\" IS NULL OR p.\"productId\" IS NULL OR s.\"segmentId\" IS NULL",
    );
    assert_eq!(orphans, 0);
}

#[test]
fn test_entity_failure_does_not_stop_siblings() {
    // origin lacks the fact table entirely
    let origin = seeded_origin(10, 2, 5, 0);
    origin
        .connection()
        .execute_batch("DROP TABLE \"fact_sales\"")
        .unwrap();
    let mut destination = SqliteWarehouse::in_memory().unwrap();

    let run = replicate(&origin, &mut destination);

    assert_eq!(run.status, RunStatus::Partial);
    assert!(run.outcome("fact_sales").unwrap().is_failed());
    assert_eq!(run.outcome("dim_product"), Some(&UnitOutcome::Succeeded(5)));
    assert_eq!(run.records_loaded, 17);
}

#[test]
fn test_empty_origin_entity_is_skipped() {
    let origin = seeded_origin(10, 2, 5, 0);
    let mut destination = SqliteWarehouse::in_memory().unwrap();
    let run = replicate(&origin, &mut destination);
    assert_eq!(run.outcome("fact_sales"), Some(&UnitOutcome::SkippedEmpty));
    assert_eq!(run.status, RunStatus::Success);
}

#[test]
fn test_schema_failure_aborts_before_data_movement() {
    let origin = seeded_origin(10, 2, 5, 10);
    let mut destination = SqliteWarehouse::in_memory().unwrap();
    destination
        .execute_batch(&[
            "CREATE TABLE other (x INT)".to_string(),
            "CREATE INDEX \"dim_date\" ON other (x)".to_string(),
        ])
        .unwrap();

    let catalog = SchemaCatalog::star_schema().unwrap();
    let err = ReplicationPipeline::new(&catalog, LoadEngine::default())
        .run(&mut WarehouseSnapshot::new(&origin), &mut destination)
        .unwrap_err();
    assert!(matches!(err, SyncError::Schema(_)));
}

#[test]
fn test_seed_origin_from_csv_twice() {
    let dir = std::env::temp_dir().join(format!("warehouse-sync-seed-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("DimDate.csv"),
        "dateid,date,Year,Quarter,QuarterName,Month,MonthName,Day,Weekday,WeekdayName\n\
         1,2023-01-01,2023,1,Q1,1,January,1,7,Sunday\n\
         2,2023-01-02,2023,1,Q1,1,January,2,1,Monday\n",
    )
    .unwrap();
    fs::write(dir.join("DimCustomerSegment.csv"), "Segmentid,City\n1,Posadas\n2,Obera\n").unwrap();
    fs::write(dir.join("DimProduct.csv"), "Productid,Producttype\n1,Terreno\n").unwrap();
    fs::write(
        dir.join("FactSales.csv"),
        "Salesid,Dateid,Productid,Segmentid,Price_PerUnit,QuantitySold\n\
         S1,1,1,1,19.99,3\n\
         S2,2,1,2,5.50,2\n",
    )
    .unwrap();

    let catalog = SchemaCatalog::star_schema().unwrap();
    let mut origin = SqliteWarehouse::in_memory().unwrap();
    let seeder = OriginSeeder::new(&catalog, 100);

    let first = seeder.run(&mut CsvSnapshotSource::new(&dir), &mut origin).unwrap();
    assert_eq!(first.records_loaded, 7);
    let second = seeder.run(&mut CsvSnapshotSource::new(&dir), &mut origin).unwrap();
    assert_eq!(second.records_loaded, 0);
    assert_eq!(second.status, RunStatus::Success);

    let facts = origin.scan(&catalog::fact_sales()).unwrap();
    assert_eq!(facts.len(), 2);
    assert_eq!(facts[0].value("totalAmount"), &Value::Numeric(59.97));

    fs::remove_dir_all(dir).ok();
}
