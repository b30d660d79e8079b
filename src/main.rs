use anyhow::{bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warehouse_sync::extract::{
    CsvSnapshotSource, HttpApiTransport, HttpPageSource, ListingCardParser, WarehouseSnapshot,
};
use warehouse_sync::orchestrator::{
    ListingsPipeline, OriginSeeder, QuotationPipeline, ReplicationPipeline,
};
use warehouse_sync::{LoadEngine, PgWarehouse, RunResult, RunStatus, SchemaCatalog, SyncConfig};

#[derive(Parser)]
#[command(name = "warehouse-sync")]
#[command(about = "Synchronize origin, API and listings data into the analytical warehouse")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Full refresh: drop, recreate and reload the star schema from the origin store
    Replicate,
    /// Incremental load of exchange-rate quotations since the last loaded date
    Quotations,
    /// Collect property listings from the results pages
    Listings,
    /// Populate the origin store from the static CSV exports
    SeedOrigin,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = SyncConfig::from_env()?;

    let result = match args.command {
        Command::Replicate => replicate(&config)?,
        Command::Quotations => quotations(&config)?,
        Command::Listings => listings(&config)?,
        Command::SeedOrigin => seed_origin(&config)?,
    };

    match result.status {
        RunStatus::Success => info!(records = result.records_loaded, "done"),
        RunStatus::Partial => warn!(
            records = result.records_loaded,
            failed = result.failed(),
            "done with failures"
        ),
        RunStatus::Failed => bail!(
            "{} run {} failed: every unit failed",
            result.pipeline,
            result.run_id
        ),
    }
    Ok(())
}

fn replicate(config: &SyncConfig) -> Result<RunResult> {
    let catalog = SchemaCatalog::star_schema()?;
    let origin = PgWarehouse::connect(config.origin()?)?;
    let mut cloud = PgWarehouse::connect(&config.cloud)?;

    let pipeline = ReplicationPipeline::new(&catalog, LoadEngine::from_config(config));
    let result = pipeline.run(&mut WarehouseSnapshot::new(&origin), &mut cloud)?;

    origin.close();
    cloud.close();
    Ok(result)
}

fn quotations(config: &SyncConfig) -> Result<RunResult> {
    let pipeline = QuotationPipeline::from_config(config)?;
    let mut transport = HttpApiTransport::new(config.api()?)?;
    let mut cloud = PgWarehouse::connect(&config.cloud)?;

    let result = pipeline.run(&mut transport, &mut cloud, Local::now().date_naive())?;
    cloud.close();
    Ok(result)
}

fn listings(config: &SyncConfig) -> Result<RunResult> {
    let pipeline = ListingsPipeline::from_config(config)?;
    let mut source = HttpPageSource::new(config.listings.timeout)?;
    let parser = ListingCardParser::new(&config.listings.base_url)?;
    let mut cloud = PgWarehouse::connect(&config.cloud)?;

    let result = pipeline.run(&mut source, &parser, &mut cloud)?;
    cloud.close();
    Ok(result)
}

fn seed_origin(config: &SyncConfig) -> Result<RunResult> {
    let catalog = SchemaCatalog::star_schema()?;
    let mut origin = PgWarehouse::connect(config.origin()?)?;
    let mut source = CsvSnapshotSource::new(&config.origin_csv_dir);

    let result = OriginSeeder::new(&catalog, config.load_batch_size).run(&mut source, &mut origin)?;
    if source.skipped() > 0 {
        warn!(rows = source.skipped(), "csv rows skipped during seeding");
    }
    origin.close();
    Ok(result)
}
