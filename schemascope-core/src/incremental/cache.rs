//! Profile caching
//!
//! [`ProfileCache`] keeps the most recently computed profile per table in
//! memory for the lifetime of the process, under an advisory memory limit.
//! [`ProfileStore`] is the durable hook behind it: an optional persisted
//! cache that survives restarts. [`SqliteProfileStore`] implements it over
//! an embedded SQLite database; with no store attached behavior is exactly
//! a cold cache.

use crate::error::Result;
use crate::types::TableProfile;
use chrono::Utc;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Cache statistics for observability.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub cached_tables: usize,
    pub estimated_size_mb: f64,
    pub max_size_mb: u64,
}

/// In-memory map from table name to its most recent profile.
///
/// The memory limit is advisory: when the estimated footprint would exceed
/// it, new entries are refused (and the caller keeps using the profile it
/// already holds) rather than evicting existing entries.
pub struct ProfileCache {
    entries: HashMap<String, (TableProfile, usize)>,
    estimated_bytes: usize,
    max_bytes: usize,
}

impl ProfileCache {
    pub fn new(max_size_mb: u64) -> Self {
        Self {
            entries: HashMap::new(),
            estimated_bytes: 0,
            max_bytes: (max_size_mb as usize) * 1024 * 1024,
        }
    }

    /// Cached profile for a table, if present.
    pub fn get(&self, table_name: &str) -> Option<TableProfile> {
        self.entries.get(table_name).map(|(p, _)| p.clone())
    }

    /// Cache a profile. Returns false when the entry was refused because the
    /// memory limit would be exceeded.
    pub fn insert(&mut self, profile: TableProfile) -> bool {
        let size = serde_json::to_string(&profile)
            .map(|s| s.len())
            .unwrap_or(0);
        let existing = self
            .entries
            .get(&profile.name)
            .map(|(_, s)| *s)
            .unwrap_or(0);

        if self.estimated_bytes - existing + size > self.max_bytes {
            tracing::warn!(
                table = %profile.name,
                estimated_mb = self.estimated_bytes / (1024 * 1024),
                "Profile cache memory limit reached, entry not cached"
            );
            return false;
        }

        self.estimated_bytes = self.estimated_bytes - existing + size;
        tracing::debug!(table = %profile.name, "Cached table profile");
        self.entries.insert(profile.name.clone(), (profile, size));
        true
    }

    pub fn remove(&mut self, table_name: &str) {
        if let Some((_, size)) = self.entries.remove(table_name) {
            self.estimated_bytes -= size;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.estimated_bytes = 0;
        tracing::info!("Profile cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached_tables: self.entries.len(),
            estimated_size_mb: self.estimated_bytes as f64 / (1024.0 * 1024.0),
            max_size_mb: (self.max_bytes / (1024 * 1024)) as u64,
        }
    }
}

// ============================================
// Durable profile store
// ============================================

/// Durable backing store for table profiles.
///
/// Consulted on cache miss and written through on cache insert, so an
/// incremental run in a fresh process can skip re-profiling unchanged
/// tables.
pub trait ProfileStore: Send + Sync {
    fn get(&self, table_name: &str) -> Result<Option<TableProfile>>;
    fn put(&self, profile: &TableProfile) -> Result<()>;
    fn remove(&self, table_name: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Current profile store schema version
const STORE_SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const STORE_MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    CREATE TABLE IF NOT EXISTS table_profiles (
        table_name  TEXT PRIMARY KEY,
        profile     JSON NOT NULL,
        updated_at  DATETIME NOT NULL
    );
    "#,
];

/// [`ProfileStore`] over an embedded SQLite database.
///
/// Profiles are stored as their canonical JSON serialization, keyed by
/// table name. Migrations are managed via `PRAGMA user_version`.
pub struct SqliteProfileStore {
    conn: Mutex<Connection>,
}

impl SqliteProfileStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("profile store lock");
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        for (i, migration) in STORE_MIGRATIONS.iter().enumerate() {
            let target = (i + 1) as i32;
            if version < target {
                conn.execute_batch(migration)?;
                conn.pragma_update(None, "user_version", target)?;
            }
        }
        tracing::debug!(version = STORE_SCHEMA_VERSION, "Profile store ready");
        Ok(())
    }
}

impl ProfileStore for SqliteProfileStore {
    fn get(&self, table_name: &str) -> Result<Option<TableProfile>> {
        let conn = self.conn.lock().expect("profile store lock");
        let mut stmt = conn.prepare("SELECT profile FROM table_profiles WHERE table_name = ?1")?;
        let mut rows = stmt.query([table_name])?;
        match rows.next()? {
            Some(row) => {
                let raw: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    fn put(&self, profile: &TableProfile) -> Result<()> {
        let conn = self.conn.lock().expect("profile store lock");
        let raw = serde_json::to_string(profile)?;
        conn.execute(
            "INSERT INTO table_profiles (table_name, profile, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(table_name) DO UPDATE SET
                 profile = excluded.profile,
                 updated_at = excluded.updated_at",
            rusqlite::params![profile.name, raw, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, table_name: &str) -> Result<()> {
        let conn = self.conn.lock().expect("profile store lock");
        conn.execute(
            "DELETE FROM table_profiles WHERE table_name = ?1",
            [table_name],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().expect("profile store lock");
        conn.execute("DELETE FROM table_profiles", [])?;
        Ok(())
    }
}
