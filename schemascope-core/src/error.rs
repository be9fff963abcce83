//! Error types for schemascope-core

use thiserror::Error;

/// Main error type for the schemascope-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration rejected at construction
    #[error("configuration error: {0}")]
    Config(String),

    /// A query issued through the connector failed
    #[error("connector error: {0}")]
    Connector(String),

    /// Pattern configuration missing or malformed
    #[error("pattern config error: {0}")]
    PatternConfig(String),

    /// Incremental state file malformed or unreadable
    #[error("state error: {0}")]
    State(String),

    /// Embedded database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Export adaptor error
    #[error("export error: {0}")]
    Export(String),
}

/// Result type alias for schemascope-core
pub type Result<T> = std::result::Result<T, Error>;
