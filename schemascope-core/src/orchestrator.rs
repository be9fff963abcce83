//! Profiling orchestration
//!
//! [`SchemaProfiler`] is the front door of the library: it wires the core
//! profiler, the configured processing strategy, and (when enabled) the
//! incremental layer together for one database.
//!
//! ```text
//! ┌───────────┐   ┌────────────────────┐   ┌──────────────────┐
//! │ Connector │──►│ SchemaProfiler     │──►│ SchemaProfile    │
//! └───────────┘   │  ├─ CoreProfiler   │   │ (typed, sorted)  │
//!                 │  ├─ TableProcessor │   └──────────────────┘
//!                 │  └─ Incremental    │
//!                 └────────────────────┘
//! ```

use crate::config::ProfilerConfig;
use crate::connector::Connector;
use crate::export;
use crate::incremental::{IncrementalManager, ProfileStore};
use crate::processor::{create_processor, TableProcessor};
use crate::profiler::CoreProfiler;
use crate::types::SchemaProfile;
use crate::error::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// End-to-end profiler for one database.
pub struct SchemaProfiler {
    config: ProfilerConfig,
    connector: Arc<dyn Connector>,
    profiler: Arc<CoreProfiler>,
    processor: Box<dyn TableProcessor>,
    incremental: Option<IncrementalManager>,
    cancel: CancellationToken,
}

impl SchemaProfiler {
    /// Build a profiler from a connector and a validated configuration.
    pub fn new(connector: Arc<dyn Connector>, config: ProfilerConfig) -> Result<Self> {
        config.validate()?;

        let profiler = Arc::new(CoreProfiler::new(connector.clone(), &config));
        let cancel = CancellationToken::new();
        let processor = create_processor(profiler.clone(), &config, cancel.clone());
        let incremental = if config.incremental_enabled {
            Some(IncrementalManager::from_config(&config)?)
        } else {
            None
        };

        Ok(Self {
            config,
            connector,
            profiler,
            processor,
            incremental,
            cancel,
        })
    }

    /// Attach a durable profile store to the incremental layer. Has no
    /// effect when incremental profiling is disabled.
    pub fn with_profile_store(mut self, store: Box<dyn ProfileStore>) -> Self {
        if let Some(incremental) = self.incremental.take() {
            self.incremental = Some(incremental.with_profile_store(store));
        } else {
            tracing::warn!("Profile store attached but incremental profiling is disabled");
        }
        self
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn core(&self) -> &Arc<CoreProfiler> {
        &self.profiler
    }

    /// Token that cancels in-flight profiling; workers finish their current
    /// table and exit, and partial results are returned.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one profiling pass: incremental when enabled, full otherwise.
    pub async fn run(&self) -> SchemaProfile {
        if !self.connector.health_check().await {
            tracing::warn!(
                database = %self.config.database_name,
                "Connector health check failed, profiling will degrade to empty results"
            );
        }

        match &self.incremental {
            Some(incremental) => {
                incremental
                    .profile_incremental(&self.profiler, self.processor.as_ref(), &self.config)
                    .await
            }
            None => self.run_full().await,
        }
    }

    /// Run a profiling pass and write the result to the configured output
    /// path, if any.
    pub async fn run_and_export(&self) -> Result<SchemaProfile> {
        let profile = self.run().await;
        if let Some(path) = &self.config.output_path {
            export::write_profile(&profile, path, self.config.export_format)?;
        }
        Ok(profile)
    }

    async fn run_full(&self) -> SchemaProfile {
        let mut schema_profile = SchemaProfile::new(
            self.config.database_name.clone(),
            self.config.schema_name.clone(),
            self.profiler.database_type(),
        );

        let tables = self.profiler.tables_info().await;
        if tables.is_empty() {
            tracing::warn!("No tables found to profile");
            return schema_profile;
        }

        schema_profile.tables = self.processor.process_tables(&tables, &self.config).await;
        schema_profile.recompute_totals();
        self.profiler
            .analyze_schema(&mut schema_profile, &self.config);

        schema_profile
    }
}
