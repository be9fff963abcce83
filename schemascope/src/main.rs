//! schemascope - profile a relational schema and export the result
//!
//! Runs the full profiling pipeline (metadata extraction, pattern
//! detection, cross-table analysis, optional incremental state) against the
//! embedded demo dataset and prints or writes the resulting profile.
//!
//! Real deployments embed `schemascope-core` and supply a driver-backed
//! `Connector`; this binary exists to exercise and demonstrate the pipeline
//! end to end.

mod demo_data;

use anyhow::{Context, Result};
use clap::Parser;
use schemascope_core::{export, logging, ProfilerConfig, SchemaProfiler};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "schemascope")]
#[command(about = "Profile a relational schema and export the result")]
#[command(version)]
struct Args {
    /// Path to a profiler config JSON file (defaults apply otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the profile to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable incremental profiling with state at this path
    #[arg(long)]
    state: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,

    /// Print a summary instead of the full profile
    #[arg(long)]
    summary: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ProfilerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ProfilerConfig::new("demo_clinic").context("failed to build default config")?,
    };

    if args.check_config {
        println!("Configuration OK");
        println!("  database:  {}", config.database_name);
        println!("  strategy:  {}", config.strategy.as_str());
        println!("  workers:   {}", config.max_workers);
        println!("  sampling:  {} rows", config.sample_data_limit);
        return Ok(());
    }

    if let Some(state) = args.state {
        config.incremental_enabled = true;
        config.incremental_state_path = Some(state);
    }
    if let Some(output) = &args.output {
        config.output_path = Some(output.clone());
    }

    logging::init(&config).context("failed to initialize logging")?;
    tracing::info!("schemascope starting");

    let connector = Arc::new(demo_data::demo_connector());
    let output_path = config.output_path.clone();

    let profiler =
        SchemaProfiler::new(connector, config).context("failed to build schema profiler")?;
    let profile = profiler
        .run_and_export()
        .await
        .context("profiling run failed")?;

    match (&output_path, args.summary) {
        (Some(path), _) => {
            println!("Profile written to {}", path.display());
            println!(
                "  {} table(s), {} column(s), {} declared relationship(s)",
                profile.total_tables,
                profile.total_columns,
                profile.cross_table_relationships.len()
            );
        }
        (None, true) => {
            println!("Database: {} ({})", profile.database_name, profile.database_type);
            println!("Tables:   {}", profile.total_tables);
            println!("Columns:  {}", profile.total_columns);
            for table in &profile.tables {
                println!(
                    "  {:<16} {:>6} rows, {} columns",
                    table.name,
                    table.estimated_row_count,
                    table.columns.len()
                );
            }
            if !profile.pattern_summary.is_empty() {
                println!("Detected patterns:");
                for (pattern, count) in &profile.pattern_summary {
                    println!("  {:<20} {}", pattern, count);
                }
            }
        }
        (None, false) => {
            println!("{}", export::to_json(&profile)?);
        }
    }

    Ok(())
}
