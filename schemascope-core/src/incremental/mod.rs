//! Incremental profiling
//!
//! Avoids re-profiling unchanged tables across runs:
//!
//! ```text
//! ┌────────────┐   ┌────────────────┐   ┌───────────────────┐
//! │ State file │──►│ ChangeDetector │──►│ changed tables    │
//! │ (JSON)     │   │ hash + counts  │   │ → TableProcessor  │
//! └────────────┘   └────────────────┘   └─────────┬─────────┘
//!        ▲                                        │
//!        │          ┌──────────────┐              ▼
//!        └──────────│ fresh state  │◄── merge with ProfileCache
//!                   └──────────────┘
//! ```
//!
//! A table is re-profiled when its schema hash changed (structure), its row
//! count moved past the configured threshold (data), or it is new. Tables
//! that disappeared are dropped from state. Any unrecoverable failure in
//! this layer falls back to a full profile; an incremental-layer problem is
//! never surfaced as a dataset failure.

mod cache;

pub use cache::{CacheStats, ProfileCache, ProfileStore, SqliteProfileStore};

use crate::config::ProfilerConfig;
use crate::error::{Error, Result};
use crate::extractor::MetadataExtractor;
use crate::processor::TableProcessor;
use crate::profiler::CoreProfiler;
use crate::types::{format_timestamp, parse_timestamp, SchemaProfile, TableInfo, TableProfile};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persisted state format version.
pub const PROFILE_VERSION: &str = "2.0";

// ============================================
// Persisted state
// ============================================

/// Per-table change-tracking record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableChangeInfo {
    pub table_name: String,
    /// MD5 over the canonical structure document, hex-encoded
    pub schema_hash: String,
    pub row_count: i64,
    /// When this table was last actually profiled
    #[serde(default, with = "opt_timestamp")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub structure_changed: bool,
    #[serde(default)]
    pub data_changed: bool,
}

/// State persisted between incremental runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementalState {
    pub database_name: String,
    #[serde(default)]
    pub schema_name: Option<String>,
    #[serde(with = "timestamp")]
    pub last_profile_timestamp: DateTime<Utc>,
    #[serde(default = "default_profile_version")]
    pub profile_version: String,
    /// Keyed by table name; a BTreeMap keeps serialization byte-stable
    pub table_states: BTreeMap<String, TableChangeInfo>,
}

fn default_profile_version() -> String {
    PROFILE_VERSION.to_string()
}

mod timestamp {
    use super::{format_timestamp, parse_timestamp, DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        ts: &DateTime<Utc>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_timestamp(&s).ok_or_else(|| serde::de::Error::custom(format!("bad timestamp: {}", s)))
    }
}

mod opt_timestamp {
    use super::{format_timestamp, parse_timestamp, DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_str(&format_timestamp(*ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        match value {
            None => Ok(None),
            Some(s) => parse_timestamp(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("bad timestamp: {}", s))),
        }
    }
}

// ============================================
// State manager
// ============================================

/// Persists [`IncrementalState`] to a single JSON file with atomic writes.
pub struct FileStateManager {
    path: PathBuf,
}

impl FileStateManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate persisted state.
    ///
    /// Missing files are normal (first run); malformed or invalid state is
    /// logged at `error` and treated as absent.
    pub fn load_state(&self) -> Option<IncrementalState> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "No existing incremental state");
            return None;
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to read state file");
                return None;
            }
        };

        match serde_json::from_str::<IncrementalState>(&content) {
            Ok(state) if Self::validate_state(&state) => {
                tracing::info!(
                    path = %self.path.display(),
                    tables = state.table_states.len(),
                    "Loaded incremental state"
                );
                Some(state)
            }
            Ok(_) => {
                tracing::error!(path = %self.path.display(), "State validation failed, ignoring existing state");
                None
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Malformed state file, ignoring");
                None
            }
        }
    }

    /// Save state atomically: serialize to `<path>.tmp`, then rename.
    pub fn save_state(&self, state: &IncrementalState) -> Result<()> {
        if !Self::validate_state(state) {
            return Err(Error::State("refusing to save invalid state".to_string()));
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(state)?;
        let tmp_path = PathBuf::from(format!("{}.tmp", self.path.display()));
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;

        tracing::debug!(path = %self.path.display(), "Saved incremental state");
        Ok(())
    }

    fn validate_state(state: &IncrementalState) -> bool {
        if state.database_name.is_empty() {
            tracing::error!("State missing database_name");
            return false;
        }
        for (name, table_state) in &state.table_states {
            if table_state.table_name != *name {
                tracing::error!(table = %name, "Table state key does not match its table_name");
                return false;
            }
            if table_state.row_count < 0 {
                tracing::error!(table = %name, "Negative row count in state");
                return false;
            }
        }
        true
    }
}

// ============================================
// Change detection
// ============================================

/// Detects structural and data changes per table against persisted state.
pub struct ChangeDetector<'a> {
    extractor: &'a MetadataExtractor,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(extractor: &'a MetadataExtractor) -> Self {
        Self { extractor }
    }

    /// Canonical fingerprint of a table's structure: columns (by ordinal
    /// position), primary keys, foreign keys, and indexes, serialized with
    /// stable key order and MD5-hashed.
    pub async fn compute_schema_hash(&self, table_name: &str) -> String {
        let columns = self.extractor.column_profiles(table_name).await;
        let primary_keys = {
            let mut pks = self.extractor.primary_keys(table_name).await;
            pks.sort();
            pks
        };
        let foreign_keys = {
            let mut fks: Vec<String> = self
                .extractor
                .foreign_keys(table_name)
                .await
                .iter()
                .map(|fk| {
                    format!(
                        "{}->{}.{}",
                        fk.column_name, fk.referenced_table, fk.referenced_column
                    )
                })
                .collect();
            fks.sort();
            fks
        };
        let indexes = {
            let mut idxs: Vec<String> = self
                .extractor
                .indexes(table_name)
                .await
                .iter()
                .map(|idx| format!("{}:{}:{}", idx.index_name, idx.column_name, idx.is_unique))
                .collect();
            idxs.sort();
            idxs
        };

        let document = json!({
            "columns": columns
                .iter()
                .map(|c| json!({
                    "name": c.name,
                    "data_type": c.data_type,
                    "is_nullable": c.is_nullable,
                    "max_length": c.max_length,
                    "default_value": c.default_value,
                    "ordinal_position": c.ordinal_position,
                }))
                .collect::<Vec<_>>(),
            "primary_keys": primary_keys,
            "foreign_keys": foreign_keys,
            "indexes": indexes,
        });

        // serde_json maps keep sorted key order, so this serialization is
        // canonical
        let serialized = document.to_string();
        let mut hasher = Md5::new();
        hasher.update(serialized.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Tables that need re-profiling: all of them on a forced or first run,
    /// otherwise new tables plus those with structure or data changes.
    pub async fn identify_changed_tables(
        &self,
        current_tables: &[TableInfo],
        previous_state: Option<&IncrementalState>,
        config: &ProfilerConfig,
    ) -> Vec<TableInfo> {
        let Some(previous) = previous_state else {
            tracing::info!("No previous state available, profiling all tables");
            return current_tables.to_vec();
        };
        if config.force_full_profile {
            tracing::info!("Full profiling forced by configuration");
            return current_tables.to_vec();
        }

        let previous_names: HashSet<&str> =
            previous.table_states.keys().map(String::as_str).collect();
        let current_names: HashSet<&str> = current_tables
            .iter()
            .map(|t| t.table_name.as_str())
            .collect();

        let removed: Vec<&&str> = previous_names.difference(&current_names).collect();
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "Tables removed since last run");
        }

        let mut to_profile = Vec::new();
        for info in current_tables {
            let Some(prev) = previous.table_states.get(&info.table_name) else {
                tracing::info!(table = %info.table_name, "New table detected");
                to_profile.push(info.clone());
                continue;
            };

            let current_hash = self.compute_schema_hash(&info.table_name).await;
            if current_hash != prev.schema_hash {
                tracing::info!(table = %info.table_name, "Schema change detected");
                to_profile.push(info.clone());
                continue;
            }

            if self.has_data_changes(info, prev, config.data_change_threshold).await {
                tracing::info!(table = %info.table_name, "Data change detected");
                to_profile.push(info.clone());
            }
        }

        tracing::info!(
            changed = to_profile.len(),
            total = current_tables.len(),
            "Change detection completed"
        );
        to_profile
    }

    async fn has_data_changes(
        &self,
        info: &TableInfo,
        previous: &TableChangeInfo,
        threshold: f64,
    ) -> bool {
        let current = self.extractor.row_count(&info.table_name).await;
        if previous.row_count > 0 {
            let change_ratio =
                (current - previous.row_count).abs() as f64 / previous.row_count as f64;
            change_ratio > threshold
        } else {
            // Previously empty; any rows now count as a change
            current > 0
        }
    }
}

// ============================================
// Incremental manager
// ============================================

/// Orchestrates one incremental run: load state, diff, profile changed
/// tables, merge with cached profiles, analyze, persist fresh state.
pub struct IncrementalManager {
    state_manager: FileStateManager,
    cache: Mutex<ProfileCache>,
    store: Option<Box<dyn ProfileStore>>,
}

impl IncrementalManager {
    pub fn new(state_manager: FileStateManager, cache: ProfileCache) -> Self {
        Self {
            state_manager,
            cache: Mutex::new(cache),
            store: None,
        }
    }

    /// Build from configuration. Requires `incremental_state_path`.
    pub fn from_config(config: &ProfilerConfig) -> Result<Self> {
        let path = config.incremental_state_path.as_ref().ok_or_else(|| {
            Error::Config("incremental_state_path required for incremental profiling".to_string())
        })?;
        Ok(Self::new(
            FileStateManager::new(path.clone()),
            ProfileCache::new(config.memory_limit_mb),
        ))
    }

    /// Attach a durable profile store, consulted on cache miss and written
    /// through on every newly computed profile.
    pub fn with_profile_store(mut self, store: Box<dyn ProfileStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().expect("profile cache lock").stats()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().expect("profile cache lock").clear();
    }

    /// Perform an incremental profiling run.
    ///
    /// Any failure inside the incremental path falls back to a full
    /// profile through `profiler`.
    pub async fn profile_incremental(
        &self,
        profiler: &CoreProfiler,
        processor: &dyn TableProcessor,
        config: &ProfilerConfig,
    ) -> SchemaProfile {
        tracing::info!(database = %config.database_name, "Starting incremental profiling");

        match self.try_incremental(profiler, processor, config).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::error!(error = %e, "Incremental profiling failed");
                tracing::info!("Falling back to full profiling");
                profiler.profile_schema(config).await
            }
        }
    }

    async fn try_incremental(
        &self,
        profiler: &CoreProfiler,
        processor: &dyn TableProcessor,
        config: &ProfilerConfig,
    ) -> Result<SchemaProfile> {
        let previous_state = self.state_manager.load_state();

        let current_tables = profiler.tables_info().await;
        if current_tables.is_empty() {
            tracing::warn!("No tables found to profile");
            return Ok(SchemaProfile::new(
                config.database_name.clone(),
                config.schema_name.clone(),
                profiler.database_type(),
            ));
        }

        let detector = ChangeDetector::new(profiler.extractor());
        let tables_to_profile = detector
            .identify_changed_tables(&current_tables, previous_state.as_ref(), config)
            .await;

        let changed_profiles = if tables_to_profile.is_empty() {
            tracing::info!("No tables have changed since last profiling");
            Vec::new()
        } else {
            tracing::info!(count = tables_to_profile.len(), "Profiling changed tables");
            processor.process_tables(&tables_to_profile, config).await
        };

        for profile in &changed_profiles {
            self.cache_profile(profile);
        }

        let scheduled_names: HashSet<String> = tables_to_profile
            .iter()
            .map(|t| t.table_name.clone())
            .collect();
        let mut schema_profile = self
            .merge_profiles(
                profiler,
                config,
                &current_tables,
                changed_profiles,
                &scheduled_names,
            )
            .await;
        profiler.analyze_schema(&mut schema_profile, config);

        let profiled_names = scheduled_names;
        self.update_state(
            &detector,
            config,
            &current_tables,
            &profiled_names,
            previous_state,
        )
        .await;

        tracing::info!(
            tables = schema_profile.total_tables,
            columns = schema_profile.total_columns,
            "Incremental profiling completed"
        );
        Ok(schema_profile)
    }

    fn cache_profile(&self, profile: &TableProfile) {
        self.cache
            .lock()
            .expect("profile cache lock")
            .insert(profile.clone());
        if let Some(store) = &self.store {
            if let Err(e) = store.put(profile) {
                tracing::warn!(table = %profile.name, error = %e, "Failed to persist profile to store");
            }
        }
    }

    /// A cached (or stored) profile for `table_name`, if one exists.
    fn lookup_profile(&self, table_name: &str) -> Option<TableProfile> {
        if let Some(profile) = self
            .cache
            .lock()
            .expect("profile cache lock")
            .get(table_name)
        {
            return Some(profile);
        }
        if let Some(store) = &self.store {
            match store.get(table_name) {
                Ok(found) => return found,
                Err(e) => {
                    tracing::warn!(table = table_name, error = %e, "Profile store lookup failed");
                }
            }
        }
        None
    }

    /// Combine freshly profiled tables with cached profiles for the
    /// unchanged ones. An unchanged table missing from the cache is
    /// profiled fresh rather than omitted; a changed table the processor
    /// dropped (timeout, cancellation) stays omitted.
    async fn merge_profiles(
        &self,
        profiler: &CoreProfiler,
        config: &ProfilerConfig,
        current_tables: &[TableInfo],
        changed_profiles: Vec<TableProfile>,
        scheduled_names: &HashSet<String>,
    ) -> SchemaProfile {
        let mut schema_profile = SchemaProfile::new(
            config.database_name.clone(),
            config.schema_name.clone(),
            profiler.database_type(),
        );

        let changed_names: HashSet<String> =
            changed_profiles.iter().map(|p| p.name.clone()).collect();
        schema_profile.tables = changed_profiles;

        for info in current_tables {
            if changed_names.contains(info.table_name.as_str()) {
                continue;
            }
            if scheduled_names.contains(info.table_name.as_str()) {
                tracing::warn!(
                    table = %info.table_name,
                    "Changed table was dropped by the processor, omitting from profile"
                );
                continue;
            }
            match self.lookup_profile(&info.table_name) {
                Some(profile) => schema_profile.tables.push(profile),
                None => {
                    tracing::info!(
                        table = %info.table_name,
                        "Unchanged table missing from cache, profiling fresh"
                    );
                    let profile = profiler.profile_table_info(info, config).await;
                    self.cache_profile(&profile);
                    schema_profile.tables.push(profile);
                }
            }
        }

        schema_profile.tables.sort_by(|a, b| a.name.cmp(&b.name));
        schema_profile.recompute_totals();
        schema_profile
    }

    /// Recompute hashes and row counts for every current table, carry over
    /// `last_modified` for unprofiled ones, drop removed tables, and
    /// persist atomically.
    async fn update_state(
        &self,
        detector: &ChangeDetector<'_>,
        config: &ProfilerConfig,
        current_tables: &[TableInfo],
        profiled_names: &HashSet<String>,
        previous_state: Option<IncrementalState>,
    ) {
        let now = Utc::now();
        let mut table_states = BTreeMap::new();

        for info in current_tables {
            let schema_hash = detector.compute_schema_hash(&info.table_name).await;
            let row_count = detector.extractor.row_count(&info.table_name).await;

            let last_modified = if profiled_names.contains(&info.table_name) {
                Some(now)
            } else {
                previous_state
                    .as_ref()
                    .and_then(|s| s.table_states.get(&info.table_name))
                    .and_then(|t| t.last_modified)
            };

            table_states.insert(
                info.table_name.clone(),
                TableChangeInfo {
                    table_name: info.table_name.clone(),
                    schema_hash,
                    row_count,
                    last_modified,
                    structure_changed: false,
                    data_changed: false,
                },
            );
        }

        let state = IncrementalState {
            database_name: config.database_name.clone(),
            schema_name: config.schema_name.clone(),
            last_profile_timestamp: now,
            profile_version: PROFILE_VERSION.to_string(),
            table_states,
        };

        // A state persistence problem must not fail the profiling run
        if let Err(e) = self.state_manager.save_state(&state) {
            tracing::error!(error = %e, "Failed to save incremental state");
        }
    }
}
