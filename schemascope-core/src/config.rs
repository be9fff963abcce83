//! Profiler configuration
//!
//! A single validated configuration object replaces scattered parameters
//! across the profiling components. Configs are plain values: they are
//! loaded from JSON (or built in code), validated once at construction, and
//! passed by reference from then on.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How tables are scheduled for profiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProfilingStrategy {
    /// One table at a time, in input order
    Sequential,
    /// Bounded worker pool
    Parallel,
    /// Parallel for large table sets, sequential otherwise
    #[default]
    Adaptive,
}

impl ProfilingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfilingStrategy::Sequential => "sequential",
            ProfilingStrategy::Parallel => "parallel",
            ProfilingStrategy::Adaptive => "adaptive",
        }
    }
}

/// Log verbosity levels accepted in profiler configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Map to a tracing filter directive.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            // tracing has no level above error; both map to error
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

/// Output formats accepted in profiler configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
    Xml,
}

/// Centralized configuration for schema profiling operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Name of the database to profile
    pub database_name: String,
    /// Schema name, for databases that distinguish schemas
    #[serde(default)]
    pub schema_name: Option<String>,

    // Processing strategy settings
    #[serde(default)]
    pub strategy: ProfilingStrategy,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,

    // Incremental profiling settings
    #[serde(default)]
    pub incremental_enabled: bool,
    #[serde(default)]
    pub incremental_state_path: Option<PathBuf>,
    /// Fraction of row-count change that marks a table's data as changed
    #[serde(default = "default_data_change_threshold")]
    pub data_change_threshold: f64,
    #[serde(default)]
    pub force_full_profile: bool,

    // Resource limits
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Per-table deadline in seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,

    // Pattern recognition settings
    #[serde(default = "default_true")]
    pub pattern_recognition_enabled: bool,
    #[serde(default)]
    pub patterns_config_path: Option<PathBuf>,

    // Logging and debugging
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default)]
    pub profile_performance: bool,

    // Output settings
    #[serde(default)]
    pub export_format: ExportFormat,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub include_sample_data: bool,
    #[serde(default = "default_sample_data_limit")]
    pub sample_data_limit: usize,

    // Validation settings
    #[serde(default = "default_true")]
    pub validate_relationships: bool,
    #[serde(default = "default_true")]
    pub validate_patterns: bool,
    #[serde(default)]
    pub strict_mode: bool,
}

fn default_max_workers() -> usize {
    4
}

fn default_parallel_threshold() -> usize {
    10
}

fn default_data_change_threshold() -> f64 {
    0.1
}

fn default_max_connections() -> usize {
    10
}

fn default_query_timeout() -> u64 {
    300
}

fn default_memory_limit_mb() -> u64 {
    1024
}

fn default_sample_data_limit() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl ProfilerConfig {
    /// Create a configuration with defaults for the given database.
    pub fn new(database_name: impl Into<String>) -> Result<Self> {
        let config = Self {
            database_name: database_name.into(),
            schema_name: None,
            strategy: ProfilingStrategy::default(),
            max_workers: default_max_workers(),
            parallel_threshold: default_parallel_threshold(),
            incremental_enabled: false,
            incremental_state_path: None,
            data_change_threshold: default_data_change_threshold(),
            force_full_profile: false,
            max_connections: default_max_connections(),
            query_timeout: default_query_timeout(),
            memory_limit_mb: default_memory_limit_mb(),
            pattern_recognition_enabled: true,
            patterns_config_path: None,
            log_level: LogLevel::default(),
            debug_mode: false,
            profile_performance: false,
            export_format: ExportFormat::default(),
            output_path: None,
            include_sample_data: true,
            sample_data_limit: default_sample_data_limit(),
            validate_relationships: true,
            validate_patterns: true,
            strict_mode: false,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file and validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;
        Self::from_json(&content)
    }

    /// Parse a configuration from a JSON string and validate it.
    ///
    /// Unknown strategy, log level, or export format values are rejected at
    /// parse time.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: ProfilerConfig = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration values. Called by every constructor.
    pub fn validate(&self) -> Result<()> {
        if self.database_name.is_empty() {
            return Err(Error::Config("database_name must not be empty".to_string()));
        }
        if self.max_workers < 1 {
            return Err(Error::Config("max_workers must be at least 1".to_string()));
        }
        if self.parallel_threshold < 1 {
            return Err(Error::Config(
                "parallel_threshold must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.data_change_threshold) {
            return Err(Error::Config(
                "data_change_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.query_timeout < 1 {
            return Err(Error::Config(
                "query_timeout must be at least 1 second".to_string(),
            ));
        }
        if self.memory_limit_mb < 64 {
            return Err(Error::Config(
                "memory_limit_mb must be at least 64MB".to_string(),
            ));
        }
        if self.max_connections < 1 {
            return Err(Error::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.incremental_enabled && self.incremental_state_path.is_none() {
            return Err(Error::Config(
                "incremental_state_path required when incremental_enabled=true".to_string(),
            ));
        }
        Ok(())
    }

    /// Extract the processing-specific settings.
    pub fn processing(&self) -> ProcessingConfig {
        ProcessingConfig {
            strategy: self.strategy,
            max_workers: self.max_workers,
            parallel_threshold: self.parallel_threshold,
            max_connections: self.max_connections,
            query_timeout: self.query_timeout,
            memory_limit_mb: self.memory_limit_mb,
        }
    }

    /// Extract the incremental-specific settings.
    pub fn incremental(&self) -> IncrementalConfig {
        IncrementalConfig {
            enabled: self.incremental_enabled,
            state_path: self.incremental_state_path.clone(),
            data_change_threshold: self.data_change_threshold,
            force_full_profile: self.force_full_profile,
        }
    }

    /// Preset tuned for development: sequential, chatty logs, tight limits.
    pub fn development(database_name: impl Into<String>, schema_name: Option<String>) -> Result<Self> {
        let mut config = Self::new(database_name)?;
        config.schema_name = schema_name;
        config.strategy = ProfilingStrategy::Sequential;
        config.log_level = LogLevel::Debug;
        config.debug_mode = true;
        config.max_connections = 2;
        config.query_timeout = 60;
        config.validate()?;
        Ok(config)
    }

    /// Preset tuned for production: adaptive scheduling, wide worker pool,
    /// optional incremental state.
    pub fn production(
        database_name: impl Into<String>,
        schema_name: Option<String>,
        state_path: Option<PathBuf>,
    ) -> Result<Self> {
        let mut config = Self::new(database_name)?;
        config.schema_name = schema_name;
        config.max_workers = 8;
        config.parallel_threshold = 5;
        if let Some(path) = state_path {
            config.incremental_enabled = true;
            config.incremental_state_path = Some(path);
            config.data_change_threshold = 0.05;
        }
        config.validate()?;
        Ok(config)
    }

    /// Preset tuned for large databases: always parallel, aggressive
    /// incremental thresholds, generous memory budget.
    pub fn large_database(
        database_name: impl Into<String>,
        schema_name: Option<String>,
        state_path: PathBuf,
    ) -> Result<Self> {
        let mut config = Self::new(database_name)?;
        config.schema_name = schema_name;
        config.strategy = ProfilingStrategy::Parallel;
        config.max_workers = 12;
        config.parallel_threshold = 3;
        config.incremental_enabled = true;
        config.incremental_state_path = Some(state_path);
        config.data_change_threshold = 0.02;
        config.max_connections = 15;
        config.memory_limit_mb = 2048;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration slice consumed by the table processors.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub strategy: ProfilingStrategy,
    pub max_workers: usize,
    pub parallel_threshold: usize,
    pub max_connections: usize,
    pub query_timeout: u64,
    pub memory_limit_mb: u64,
}

/// Configuration slice consumed by the incremental manager.
#[derive(Debug, Clone)]
pub struct IncrementalConfig {
    pub enabled: bool,
    pub state_path: Option<PathBuf>,
    pub data_change_threshold: f64,
    pub force_full_profile: bool,
}
