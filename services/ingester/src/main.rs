//! Ingester - Loads an IBGE harvested-area export into the serving stores
//!
//! Responsibilities:
//! - Read the spreadsheet/CSV export (municipality rows x crop columns)
//! - Normalize codes, sanitize area cells, build crop-indexed records
//! - Full-refresh the static JSON artifact and/or the PostgreSQL tables
//! - Append one processing-log entry per store and run
//!
//! Usage:
//!   cargo run --bin ingester -- ingest --input data/ibge_2023_hectares_colhidos.xlsx
//!   cargo run --bin ingester -- ingest --input export.csv --db
//!   cargo run --bin ingester -- combine-geojson --dir static/data

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use harvest_core::geo::combine_geojson;
use harvest_core::run::{run_ingestion, RunSummary};
use harvest_core::store::{ensure_schema, FileSink, PgSink, RecordSink};
use harvest_core::DEFAULT_YEAR;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ingester", about = "Loads IBGE harvested-area exports")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a spreadsheet or CSV export
    Ingest(IngestArgs),
    /// Merge per-state municipality GeoJSON files into one
    CombineGeojson {
        /// Directory holding <UF>.geojson files
        #[arg(long, default_value = "static/data")]
        dir: PathBuf,

        /// Output file
        #[arg(long, default_value = "static/data/brazil_municipalities_all.geojson")]
        out: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct IngestArgs {
    /// Path to the export (.xlsx, .xls, .ods, .xlsb or .csv)
    #[arg(long)]
    input: PathBuf,

    /// Dataset vintage stored with every record
    #[arg(long, default_value_t = DEFAULT_YEAR)]
    year: i32,

    /// Static JSON artifact served by the API
    #[arg(long, default_value = "data/crop_data_static.json")]
    output: PathBuf,

    /// Also write to PostgreSQL (DB_URL)
    #[arg(long, default_value = "false")]
    db: bool,

    /// Dry run - ingest and report, write nothing
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn ingest(args: IngestArgs) -> Result<()> {
    println!("=== IBGE Harvested Area Ingester ===");
    println!("Input: {}", args.input.display());
    println!("Year: {}", args.year);
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "live" });

    let mut sinks: Vec<Box<dyn RecordSink>> = Vec::new();
    if !args.dry_run {
        sinks.push(Box::new(FileSink::new(&args.output)));

        if args.db {
            let db_url = std::env::var("DB_URL").context("DB_URL env var missing")?;
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await
                .context("Failed to connect to database")?;
            ensure_schema(&pool).await.context("Failed to create schema")?;
            sinks.push(Box::new(PgSink::new(pool)));
        }
    }

    let sink_refs: Vec<&dyn RecordSink> = sinks.iter().map(|s| s.as_ref()).collect();
    let summary = run_ingestion(&args.input, args.year, &sink_refs).await;
    print_summary(&summary);

    match summary.error {
        Some(error) => anyhow::bail!("ingestion failed: {}", error),
        None => Ok(()),
    }
}

fn print_summary(summary: &RunSummary) {
    if !summary.success {
        println!("\n=== Ingestion Failed ===");
        println!("File: {}", summary.filename);
        return;
    }

    println!("\n=== Ingestion Complete ===");
    println!("Municipalities processed: {}", summary.municipalities);
    println!("Valid records: {}", summary.processed);
    println!("Skipped cells/rows: {}", summary.errors);
    println!("Crops with data: {}", summary.crops);
    println!("Unique municipalities with data: {}", summary.unique_municipalities);

    if !summary.top_crops.is_empty() {
        println!("\nTop {} crops by municipality count:", summary.top_crops.len());
        for (i, (crop, count)) in summary.top_crops.iter().enumerate() {
            println!("  {:2}. {}: {} municipalities", i + 1, crop, count);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    match args.command {
        Command::Ingest(ingest_args) => ingest(ingest_args).await,
        Command::CombineGeojson { dir, out } => {
            info!(dir = %dir.display(), "combining state geojson files");
            let summary = combine_geojson(&dir, &out).context("Failed to combine GeoJSON")?;
            println!(
                "Combined {} municipalities from {} states into {}",
                summary.total_features,
                summary.per_state.len(),
                out.display()
            );
            if !summary.missing.is_empty() {
                println!("Missing states: {}", summary.missing.join(", "));
            }
            Ok(())
        }
    }
}
