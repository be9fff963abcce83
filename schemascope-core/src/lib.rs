//! # schemascope-core
//!
//! Core library for schemascope - a relational schema profiler that produces
//! structured, machine-readable descriptions of every table and column for
//! downstream semantic-mapping and embedding pipelines.
//!
//! This library provides:
//! - Dialect-aware metadata extraction (MySQL, PostgreSQL, MSSQL)
//! - Concurrent table processing with bounded connections and timeouts
//! - Incremental change detection with atomically persisted state
//! - Pattern recognition and semantic enrichment for columns
//!
//! ## Architecture
//!
//! Profiling flows through three layers:
//! - **Extraction:** dialect queries produce raw per-table metadata
//! - **Profiling:** per-table profiles plus schema-level cross-table analysis
//! - **Incremental:** schema hashes and row counts decide what to re-profile
//!
//! ## Example
//!
//! ```rust,no_run
//! use schemascope_core::{ProfilerConfig, SchemaProfiler, SqliteConnector};
//! use std::sync::Arc;
//!
//! # async fn run() -> schemascope_core::Result<()> {
//! let config = ProfilerConfig::new("clinic")?;
//! let connector = Arc::new(SqliteConnector::open(std::path::Path::new("clinic.db"))?);
//!
//! let profiler = SchemaProfiler::new(connector, config)?;
//! let profile = profiler.run().await;
//! println!("{} tables, {} columns", profile.total_tables, profile.total_columns);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::{ExportFormat, LogLevel, ProfilerConfig, ProfilingStrategy};
pub use connector::{Connector, SqliteConnector, StaticConnector};
pub use error::{Error, Result};
pub use orchestrator::SchemaProfiler;
pub use types::*;

// Public modules
pub mod config;
pub mod connector;
pub mod dialect;
pub mod enrich;
pub mod error;
pub mod export;
pub mod extractor;
pub mod incremental;
pub mod logging;
pub mod patterns;
pub mod processor;
pub mod profiler;
pub mod types;

mod orchestrator;
