//! Core domain types for schemascope
//!
//! These types represent the structured description a profiling run produces
//! for a relational database: per-column metadata, per-table structure, and
//! the schema-level cross-table analysis. They are the wire format consumed
//! by downstream semantic-mapping and embedding pipelines, so field names
//! and ordering are part of the contract.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Profile** | The structured description produced for a column, table, or database |
//! | **Dialect** | The per-database variant of SQL and identifier quoting rules |
//! | **Detected pattern** | A domain label (e.g. `email_address`) assigned to a column by the recognizer |
//! | **Potential relationship** | A heuristic FK candidate emitted by name-based analysis, not declared by the database |

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single result row returned by a connector: column name to value.
///
/// `serde_json::Map` keeps keys sorted, which makes serialized sample rows
/// deterministic across runs.
pub type Row = serde_json::Map<String, serde_json::Value>;

// ============================================
// Database type
// ============================================

/// Supported database families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Mysql,
    Postgresql,
    Mssql,
    Unknown,
}

impl DatabaseType {
    /// Returns the identifier used in serialized profiles
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Mysql => "mysql",
            DatabaseType::Postgresql => "postgresql",
            DatabaseType::Mssql => "mssql",
            DatabaseType::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(DatabaseType::Mysql),
            "postgresql" | "postgres" => Ok(DatabaseType::Postgresql),
            "mssql" => Ok(DatabaseType::Mssql),
            "unknown" => Ok(DatabaseType::Unknown),
            other => Err(format!("unknown database type: {}", other)),
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Table listing
// ============================================

/// Basic information about a table, as returned by the dialect's tables query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name
    pub table_name: String,
    /// Table type, e.g. "BASE TABLE"
    pub table_type: String,
    /// Table comment, if the database records one
    pub table_comment: Option<String>,
    /// Estimated row count from catalog statistics (MySQL only)
    pub estimated_rows: Option<i64>,
}

// ============================================
// Column profile
// ============================================

/// Reference from a foreign-key column to the column it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyReference {
    pub referenced_table: String,
    pub referenced_column: String,
    pub constraint_name: String,
}

/// Profile information for a single database column.
///
/// Contains metadata, constraints, sample data, and detected patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    /// Column name
    pub name: String,
    /// Declared data type, e.g. "varchar", "int"
    pub data_type: String,
    /// 1-based position within the table
    pub ordinal_position: u32,
    pub is_nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_indexed: bool,
    /// Maximum character length for string types
    pub max_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
    pub default_value: Option<String>,
    pub column_comment: Option<String>,
    /// Values of this column in the first sampled rows, in row order
    #[serde(default)]
    pub sample_values: Vec<serde_json::Value>,
    /// Pattern names assigned by the recognizer, most specific first
    #[serde(default)]
    pub detected_patterns: Vec<String>,
    /// Present exactly when `is_foreign_key` is true
    pub foreign_key_reference: Option<ForeignKeyReference>,
}

impl ColumnProfile {
    /// Create a column profile with metadata only; flags and samples are
    /// filled in by enrichment.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal_position: u32) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            ordinal_position,
            is_nullable: true,
            is_primary_key: false,
            is_foreign_key: false,
            is_unique: false,
            is_indexed: false,
            max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            default_value: None,
            column_comment: None,
            sample_values: Vec::new(),
            detected_patterns: Vec::new(),
            foreign_key_reference: None,
        }
    }

    /// Check if the column carries a specific detected pattern.
    pub fn has_pattern(&self, pattern: &str) -> bool {
        self.detected_patterns.iter().any(|p| p == pattern)
    }

    /// Check if the column is any type of key (PK or FK).
    pub fn is_key_column(&self) -> bool {
        self.is_primary_key || self.is_foreign_key
    }

    /// List the constraints applied to this column.
    pub fn constraints(&self) -> Vec<&'static str> {
        let mut constraints = Vec::new();
        if self.is_primary_key {
            constraints.push("PRIMARY KEY");
        }
        if self.is_foreign_key {
            constraints.push("FOREIGN KEY");
        }
        if self.is_unique {
            constraints.push("UNIQUE");
        }
        if !self.is_nullable {
            constraints.push("NOT NULL");
        }
        if self.is_indexed {
            constraints.push("INDEXED");
        }
        constraints
    }
}

// ============================================
// Table profile
// ============================================

/// A declared foreign-key relationship, one row per constrained column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub constraint_name: String,
}

/// One (index, column) membership row. The table's primary-key index is
/// excluded by the dialect queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub index_name: String,
    pub column_name: String,
    pub is_unique: bool,
}

/// A column nominated as a foreign key by naming convention alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FkCandidate {
    pub column_name: String,
    pub data_type: String,
    pub reason: String,
}

/// Profile information for a single database table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableProfile {
    /// Table name
    pub name: String,
    /// Schema the table lives in, when the database distinguishes schemas
    pub schema: Option<String>,
    /// Table type, e.g. "BASE TABLE"
    #[serde(default = "default_table_type")]
    pub table_type: String,
    pub table_comment: Option<String>,
    pub estimated_row_count: i64,
    /// Columns sorted by ordinal position (contiguous 1..N)
    #[serde(default)]
    pub columns: Vec<ColumnProfile>,
    /// Primary-key column names, in key order
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub indexes: Vec<IndexInfo>,
    /// Up to `sample_data_limit` sampled rows
    #[serde(default)]
    pub sample_data: Vec<Row>,
    /// FK columns that reference this table itself
    #[serde(default)]
    pub self_referencing_columns: Vec<String>,
    #[serde(default)]
    pub potential_fk_candidates: Vec<FkCandidate>,
}

fn default_table_type() -> String {
    "BASE TABLE".to_string()
}

impl TableProfile {
    /// Create an empty profile for a table that could not be extracted.
    pub fn minimal(name: impl Into<String>, schema: Option<String>) -> Self {
        Self {
            name: name.into(),
            schema,
            table_type: default_table_type(),
            table_comment: None,
            estimated_row_count: 0,
            columns: Vec::new(),
            primary_keys: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            sample_data: Vec::new(),
            self_referencing_columns: Vec::new(),
            potential_fk_candidates: Vec::new(),
        }
    }

    /// Look up a column profile by name.
    pub fn column(&self, column_name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == column_name)
    }

    /// Columns that are part of the primary key.
    pub fn primary_key_columns(&self) -> Vec<&ColumnProfile> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }

    /// Columns that participate in a foreign-key constraint.
    pub fn foreign_key_columns(&self) -> Vec<&ColumnProfile> {
        self.columns.iter().filter(|c| c.is_foreign_key).collect()
    }

    pub fn has_foreign_keys(&self) -> bool {
        !self.foreign_keys.is_empty()
    }

    pub fn has_self_references(&self) -> bool {
        !self.self_referencing_columns.is_empty()
    }

    /// Fully qualified name including the schema when present.
    pub fn full_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

// ============================================
// Schema-level analysis
// ============================================

/// A declared foreign key lifted to the schema level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossTableRelationship {
    /// Always "foreign_key"
    #[serde(rename = "type")]
    pub relation_type: String,
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub constraint_name: String,
}

/// Confidence grade for heuristic relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// A relationship nominated from column-naming conventions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotentialRelationship {
    /// Always "potential_foreign_key"
    #[serde(rename = "type")]
    pub relation_type: String,
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub confidence: Confidence,
    pub reason: String,
}

/// Complete database schema profile: one snapshot of one database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaProfile {
    pub database_name: String,
    pub schema_name: Option<String>,
    pub database_type: DatabaseType,
    /// ISO-8601 UTC timestamp of when this profile was assembled
    pub profiling_timestamp: String,
    pub total_tables: usize,
    pub total_columns: usize,
    /// Tables sorted by name
    #[serde(default)]
    pub tables: Vec<TableProfile>,
    #[serde(default)]
    pub cross_table_relationships: Vec<CrossTableRelationship>,
    #[serde(default)]
    pub potential_relationships: Vec<PotentialRelationship>,
    /// Pattern name to occurrence count across all columns
    #[serde(default)]
    pub pattern_summary: BTreeMap<String, u64>,
}

impl SchemaProfile {
    /// Create an empty profile stamped with the current time.
    pub fn new(
        database_name: impl Into<String>,
        schema_name: Option<String>,
        database_type: DatabaseType,
    ) -> Self {
        Self {
            database_name: database_name.into(),
            schema_name,
            database_type,
            profiling_timestamp: format_timestamp(Utc::now()),
            total_tables: 0,
            total_columns: 0,
            tables: Vec::new(),
            cross_table_relationships: Vec::new(),
            potential_relationships: Vec::new(),
            pattern_summary: BTreeMap::new(),
        }
    }

    /// Look up a table profile by name.
    pub fn table(&self, table_name: &str) -> Option<&TableProfile> {
        self.tables.iter().find(|t| t.name == table_name)
    }

    /// Names of all profiled tables, in profile order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Tables that declare at least one foreign key.
    pub fn tables_with_foreign_keys(&self) -> Vec<&TableProfile> {
        self.tables.iter().filter(|t| t.has_foreign_keys()).collect()
    }

    /// Recompute the derived totals from `tables`.
    pub fn recompute_totals(&mut self) {
        self.total_tables = self.tables.len();
        self.total_columns = self.tables.iter().map(|t| t.columns.len()).sum();
    }

    /// Total number of detected pattern occurrences across all columns.
    pub fn total_pattern_occurrences(&self) -> u64 {
        self.pattern_summary.values().sum()
    }
}

// ============================================
// Timestamp helpers
// ============================================

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Format a UTC timestamp in the microsecond ISO-8601 form used by persisted
/// state files and exported profiles.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a persisted timestamp. Accepts the microsecond ISO-8601 form this
/// library writes, plus RFC 3339 for state produced by other tools.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_round_trip() {
        for (s, dt) in [
            ("mysql", DatabaseType::Mysql),
            ("postgresql", DatabaseType::Postgresql),
            ("mssql", DatabaseType::Mssql),
            ("unknown", DatabaseType::Unknown),
        ] {
            assert_eq!(s.parse::<DatabaseType>().unwrap(), dt);
            assert_eq!(dt.as_str(), s);
        }
        assert!("oracle".parse::<DatabaseType>().is_err());
    }

    #[test]
    fn test_column_constraints() {
        let mut col = ColumnProfile::new("id", "int", 1);
        col.is_primary_key = true;
        col.is_unique = true;
        col.is_nullable = false;
        assert_eq!(col.constraints(), vec!["PRIMARY KEY", "UNIQUE", "NOT NULL"]);
        assert!(col.is_key_column());
    }

    #[test]
    fn test_table_full_name() {
        let table = TableProfile::minimal("patients", Some("clinical".to_string()));
        assert_eq!(table.full_name(), "clinical.patients");

        let bare = TableProfile::minimal("patients", None);
        assert_eq!(bare.full_name(), "patients");
    }

    #[test]
    fn test_recompute_totals() {
        let mut profile = SchemaProfile::new("db", None, DatabaseType::Mysql);
        let mut t1 = TableProfile::minimal("a", None);
        t1.columns.push(ColumnProfile::new("id", "int", 1));
        t1.columns.push(ColumnProfile::new("name", "varchar", 2));
        let t2 = TableProfile::minimal("b", None);
        profile.tables = vec![t1, t2];
        profile.recompute_totals();
        assert_eq!(profile.total_tables, 2);
        assert_eq!(profile.total_columns, 2);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc::now();
        let s = format_timestamp(now);
        let parsed = parse_timestamp(&s).expect("parse formatted timestamp");
        // Microsecond precision is preserved by the format
        assert_eq!(format_timestamp(parsed), s);
        assert!(parse_timestamp("2024-01-02T03:04:05.000001").is_some());
        assert!(parse_timestamp("not a timestamp").is_none());
    }

    #[test]
    fn test_serialized_field_names() {
        let profile = SchemaProfile::new("appointments_db", None, DatabaseType::Postgresql);
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["database_name"], "appointments_db");
        assert_eq!(json["database_type"], "postgresql");
        assert!(json["schema_name"].is_null());
        assert_eq!(json["total_tables"], 0);
    }

    #[test]
    fn test_relationship_type_field_rename() {
        let rel = CrossTableRelationship {
            relation_type: "foreign_key".to_string(),
            from_table: "appointments".to_string(),
            from_column: "patient_id".to_string(),
            to_table: "patients".to_string(),
            to_column: "id".to_string(),
            constraint_name: "fk_appt_patient".to_string(),
        };
        let json = serde_json::to_value(&rel).unwrap();
        assert_eq!(json["type"], "foreign_key");
    }
}
