//! Core schema profiling
//!
//! [`CoreProfiler`] profiles one table end-to-end by composing the dialect,
//! the metadata extractor, and the pattern recognizer, and computes the
//! schema-level cross-table analysis once all tables are in. Scheduling,
//! incremental state, and caching are handled by other components.

use crate::config::ProfilerConfig;
use crate::connector::Connector;
use crate::extractor::MetadataExtractor;
use crate::patterns::PatternRecognizer;
use crate::types::{
    Confidence, CrossTableRelationship, DatabaseType, PotentialRelationship, SchemaProfile,
    TableInfo, TableProfile,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Core schema profiler focused on pure profiling logic.
pub struct CoreProfiler {
    connector: Arc<dyn Connector>,
    extractor: MetadataExtractor,
    recognizer: Arc<PatternRecognizer>,
}

impl CoreProfiler {
    /// Build a profiler for the given connector and configuration.
    pub fn new(connector: Arc<dyn Connector>, config: &ProfilerConfig) -> Self {
        let extractor = MetadataExtractor::new(
            connector.clone(),
            config.database_name.clone(),
            config.schema_name.clone(),
        );
        let recognizer = Arc::new(PatternRecognizer::new(
            config.patterns_config_path.as_deref(),
        ));
        Self {
            connector,
            extractor,
            recognizer,
        }
    }

    /// Build a profiler with an externally constructed recognizer, e.g. one
    /// sharing rules across several databases.
    pub fn with_recognizer(
        connector: Arc<dyn Connector>,
        config: &ProfilerConfig,
        recognizer: Arc<PatternRecognizer>,
    ) -> Self {
        let extractor = MetadataExtractor::new(
            connector.clone(),
            config.database_name.clone(),
            config.schema_name.clone(),
        );
        Self {
            connector,
            extractor,
            recognizer,
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        self.connector.database_type()
    }

    pub fn extractor(&self) -> &MetadataExtractor {
        &self.extractor
    }

    pub fn recognizer(&self) -> &Arc<PatternRecognizer> {
        &self.recognizer
    }

    /// Basic information about all tables in the database.
    pub async fn tables_info(&self) -> Vec<TableInfo> {
        self.extractor.tables_info().await
    }

    /// Profile a single table comprehensively.
    ///
    /// Sub-query failures degrade to empty fields inside the extractor, so
    /// this always produces a well-formed profile; a table that cannot be
    /// reached at all comes back minimal rather than failing the run.
    pub async fn profile_table(&self, table_name: &str, config: &ProfilerConfig) -> TableProfile {
        tracing::debug!(table = table_name, "Profiling table");

        let sample_limit = if config.include_sample_data {
            config.sample_data_limit
        } else {
            0
        };
        let metadata = self
            .extractor
            .complete_table_metadata(table_name, sample_limit)
            .await;

        let mut profile = TableProfile {
            name: metadata.table_name,
            schema: config.schema_name.clone(),
            table_type: "BASE TABLE".to_string(),
            table_comment: None,
            estimated_row_count: metadata.row_count,
            columns: metadata.columns,
            primary_keys: metadata.primary_keys,
            foreign_keys: metadata.foreign_keys,
            indexes: metadata.indexes,
            sample_data: metadata.sample_data,
            self_referencing_columns: metadata.self_referencing_columns,
            potential_fk_candidates: metadata.potential_fk_candidates,
        };

        if config.pattern_recognition_enabled {
            for column in &mut profile.columns {
                if column.sample_values.is_empty() {
                    continue;
                }
                column.detected_patterns = self
                    .recognizer
                    .detect_patterns(&column.sample_values, Some(&column.name));
            }
        }

        profile
    }

    /// Profile a table and overlay the type, comment, and listing metadata
    /// from the tables query.
    pub async fn profile_table_info(
        &self,
        info: &TableInfo,
        config: &ProfilerConfig,
    ) -> TableProfile {
        let mut profile = self.profile_table(&info.table_name, config).await;
        profile.table_type = info.table_type.clone();
        profile.table_comment = info.table_comment.clone();
        profile
    }

    /// Profile the complete database schema sequentially.
    ///
    /// This is the strategy-free path used by small runs and as the
    /// fallback when the incremental layer fails.
    pub async fn profile_schema(&self, config: &ProfilerConfig) -> SchemaProfile {
        tracing::info!(database = %config.database_name, "Starting schema profiling");

        let mut schema_profile = SchemaProfile::new(
            config.database_name.clone(),
            config.schema_name.clone(),
            self.database_type(),
        );

        let tables_info = self.tables_info().await;
        if tables_info.is_empty() {
            tracing::warn!("No tables found to profile");
            return schema_profile;
        }

        for info in &tables_info {
            let profile = self.profile_table_info(info, config).await;
            schema_profile.tables.push(profile);
        }
        schema_profile.tables.sort_by(|a, b| a.name.cmp(&b.name));
        schema_profile.recompute_totals();

        self.analyze_schema(&mut schema_profile, config);

        tracing::info!(
            tables = schema_profile.total_tables,
            columns = schema_profile.total_columns,
            "Schema profiling completed"
        );
        schema_profile
    }

    /// Compute the cross-table analysis and pattern summary.
    ///
    /// Recomputes from the current `tables`, so applying it twice yields
    /// the same result.
    pub fn analyze_schema(&self, profile: &mut SchemaProfile, config: &ProfilerConfig) {
        if config.validate_relationships {
            profile.cross_table_relationships = cross_table_relationships(&profile.tables);
            profile.potential_relationships = potential_relationships(&profile.tables);
        }
        if config.pattern_recognition_enabled {
            profile.pattern_summary = pattern_summary(&profile.tables);
        }
    }
}

/// Every declared foreign key, lifted to the schema level.
fn cross_table_relationships(tables: &[TableProfile]) -> Vec<CrossTableRelationship> {
    let mut relationships = Vec::new();
    for table in tables {
        for fk in &table.foreign_keys {
            relationships.push(CrossTableRelationship {
                relation_type: "foreign_key".to_string(),
                from_table: table.name.clone(),
                from_column: fk.column_name.clone(),
                to_table: fk.referenced_table.clone(),
                to_column: fk.referenced_column.clone(),
                constraint_name: fk.constraint_name.clone(),
            });
        }
    }
    relationships
}

/// Nominate relationships from column-naming conventions.
///
/// For each non-key column, the first primary key of every other table is
/// checked: `{table}_id`, `{table}_{pk}`, `{table}_key`, or the bare PK
/// column name all count as a medium-confidence hint.
fn potential_relationships(tables: &[TableProfile]) -> Vec<PotentialRelationship> {
    let pk_map: Vec<(&str, &str)> = tables
        .iter()
        .filter_map(|t| {
            t.primary_keys
                .first()
                .map(|pk| (t.name.as_str(), pk.as_str()))
        })
        .collect();

    let mut seen = HashSet::new();
    let mut relationships = Vec::new();

    for table in tables {
        for column in &table.columns {
            if column.is_foreign_key || column.is_primary_key {
                continue;
            }
            let column_lower = column.name.to_lowercase();

            for (target_table, pk_column) in &pk_map {
                if *target_table == table.name {
                    continue;
                }
                let target_lower = target_table.to_lowercase();
                let pk_lower = pk_column.to_lowercase();

                let matches = column_lower == format!("{}_id", target_lower)
                    || column_lower == format!("{}_{}", target_lower, pk_lower)
                    || column_lower == format!("{}_key", target_lower)
                    || column_lower == pk_lower;
                if !matches {
                    continue;
                }

                let key = (
                    table.name.clone(),
                    column.name.clone(),
                    target_table.to_string(),
                    pk_column.to_string(),
                );
                if !seen.insert(key) {
                    continue;
                }

                relationships.push(PotentialRelationship {
                    relation_type: "potential_foreign_key".to_string(),
                    from_table: table.name.clone(),
                    from_column: column.name.clone(),
                    to_table: target_table.to_string(),
                    to_column: pk_column.to_string(),
                    confidence: Confidence::Medium,
                    reason: "Column name pattern suggests relationship".to_string(),
                });
            }
        }
    }
    relationships
}

/// Histogram of detected patterns across all columns.
fn pattern_summary(tables: &[TableProfile]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for table in tables {
        for column in &table.columns {
            for pattern in &column.detected_patterns {
                *counts.entry(pattern.clone()).or_insert(0) += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::StaticConnector;
    use crate::types::{ColumnProfile, ForeignKey, Row};
    use serde_json::{json, Value};

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn config() -> ProfilerConfig {
        ProfilerConfig::new("clinic").unwrap()
    }

    fn patients_connector() -> StaticConnector {
        StaticConnector::new(DatabaseType::Mysql)
            .with_response(
                "INFORMATION_SCHEMA.COLUMNS",
                vec![
                    row(&[
                        ("column_name", json!("id")),
                        ("data_type", json!("int")),
                        ("is_nullable", json!("NO")),
                        ("column_key", json!("PRI")),
                        ("ordinal_position", json!(1)),
                    ]),
                    row(&[
                        ("column_name", json!("email")),
                        ("data_type", json!("varchar")),
                        ("is_nullable", json!("YES")),
                        ("ordinal_position", json!(2)),
                    ]),
                ],
            )
            .with_response(
                "CONSTRAINT_NAME = 'PRIMARY'",
                vec![row(&[("column_name", json!("id"))])],
            )
            .with_response(
                "SELECT *",
                vec![
                    row(&[("id", json!(1)), ("email", json!("a@clinic.org"))]),
                    row(&[("id", json!(2)), ("email", json!("b@clinic.org"))]),
                    row(&[("id", json!(3)), ("email", json!("c@clinic.org"))]),
                ],
            )
            .with_response("COUNT(*)", vec![row(&[("row_count", json!(3))])])
    }

    #[tokio::test]
    async fn test_profile_table_detects_patterns() {
        let profiler = CoreProfiler::new(Arc::new(patients_connector()), &config());
        let profile = profiler.profile_table("patients", &config()).await;

        assert_eq!(profile.name, "patients");
        assert_eq!(profile.estimated_row_count, 3);
        assert_eq!(profile.columns.len(), 2);
        assert_eq!(profile.sample_data.len(), 3);

        let email = profile.column("email").unwrap();
        assert_eq!(email.detected_patterns, vec!["email_address"]);
    }

    #[tokio::test]
    async fn test_include_sample_data_disabled_clears_both() {
        let profiler = CoreProfiler::new(Arc::new(patients_connector()), &config());
        let mut cfg = config();
        cfg.include_sample_data = false;

        let profile = profiler.profile_table("patients", &cfg).await;
        assert!(profile.sample_data.is_empty());
        for column in &profile.columns {
            assert!(column.sample_values.is_empty());
            assert!(column.detected_patterns.is_empty());
        }
    }

    #[tokio::test]
    async fn test_pattern_recognition_disabled() {
        let profiler = CoreProfiler::new(Arc::new(patients_connector()), &config());
        let mut cfg = config();
        cfg.pattern_recognition_enabled = false;

        let profile = profiler.profile_table("patients", &cfg).await;
        let email = profile.column("email").unwrap();
        assert!(!email.sample_values.is_empty());
        assert!(email.detected_patterns.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_table_yields_minimal_profile() {
        let connector = StaticConnector::new(DatabaseType::Mysql)
            .failing_on("INFORMATION_SCHEMA")
            .failing_on("COUNT(*)")
            .failing_on("SELECT *");
        let profiler = CoreProfiler::new(Arc::new(connector), &config());

        let profile = profiler.profile_table("ghost", &config()).await;
        assert_eq!(profile.name, "ghost");
        assert!(profile.columns.is_empty());
        assert_eq!(profile.estimated_row_count, 0);
    }

    fn table_with_columns(name: &str, pk: Option<&str>, columns: Vec<ColumnProfile>) -> TableProfile {
        let mut table = TableProfile::minimal(name, None);
        table.columns = columns;
        if let Some(pk) = pk {
            table.primary_keys = vec![pk.to_string()];
            if let Some(col) = table.columns.iter_mut().find(|c| c.name == pk) {
                col.is_primary_key = true;
                col.is_unique = true;
                col.is_nullable = false;
            }
        }
        table
    }

    fn analysis_fixture() -> Vec<TableProfile> {
        let patient = table_with_columns(
            "patient",
            Some("id"),
            vec![
                ColumnProfile::new("id", "int", 1),
                ColumnProfile::new("name", "varchar", 2),
            ],
        );

        let mut appointment = table_with_columns(
            "appointment",
            Some("id"),
            vec![
                ColumnProfile::new("id", "int", 1),
                ColumnProfile::new("patient_id", "int", 2),
                ColumnProfile::new("provider_id", "int", 3),
            ],
        );
        appointment.foreign_keys = vec![ForeignKey {
            column_name: "provider_id".to_string(),
            referenced_table: "provider".to_string(),
            referenced_column: "id".to_string(),
            constraint_name: "fk_appt_provider".to_string(),
        }];
        if let Some(col) = appointment
            .columns
            .iter_mut()
            .find(|c| c.name == "provider_id")
        {
            col.is_foreign_key = true;
        }

        let provider = table_with_columns(
            "provider",
            Some("id"),
            vec![ColumnProfile::new("id", "int", 1)],
        );

        vec![patient, appointment, provider]
    }

    #[tokio::test]
    async fn test_analyze_schema_relationships() {
        let profiler = CoreProfiler::new(
            Arc::new(StaticConnector::new(DatabaseType::Mysql)),
            &config(),
        );
        let mut profile = SchemaProfile::new("clinic", None, DatabaseType::Mysql);
        profile.tables = analysis_fixture();
        profile.recompute_totals();

        profiler.analyze_schema(&mut profile, &config());

        // Declared FK is lifted to the schema level
        assert_eq!(profile.cross_table_relationships.len(), 1);
        let declared = &profile.cross_table_relationships[0];
        assert_eq!(declared.from_table, "appointment");
        assert_eq!(declared.to_table, "provider");

        // patient_id matches the patient table by naming convention;
        // the declared provider FK must not reappear as potential
        assert_eq!(profile.potential_relationships.len(), 1);
        let potential = &profile.potential_relationships[0];
        assert_eq!(potential.from_column, "patient_id");
        assert_eq!(potential.to_table, "patient");
        assert_eq!(potential.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn test_analyze_schema_idempotent() {
        let profiler = CoreProfiler::new(
            Arc::new(StaticConnector::new(DatabaseType::Mysql)),
            &config(),
        );
        let mut profile = SchemaProfile::new("clinic", None, DatabaseType::Mysql);
        profile.tables = analysis_fixture();
        profile.recompute_totals();

        profiler.analyze_schema(&mut profile, &config());
        let first = serde_json::to_value(&profile).unwrap();
        profiler.analyze_schema(&mut profile, &config());
        let second = serde_json::to_value(&profile).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_pattern_summary_counts() {
        let mut tables = analysis_fixture();
        tables[0].columns[1].detected_patterns = vec!["person_name".to_string()];
        tables[1].columns[1].detected_patterns =
            vec!["patient_id".to_string(), "basic_id_fallback".to_string()];

        let summary = pattern_summary(&tables);
        assert_eq!(summary["person_name"], 1);
        assert_eq!(summary["patient_id"], 1);
        assert_eq!(summary["basic_id_fallback"], 1);
        assert_eq!(summary.len(), 3);
    }

    #[tokio::test]
    async fn test_profile_schema_empty_database() {
        let connector = StaticConnector::new(DatabaseType::Mysql);
        let profiler = CoreProfiler::new(Arc::new(connector), &config());
        let profile = profiler.profile_schema(&config()).await;
        assert_eq!(profile.total_tables, 0);
        assert_eq!(profile.total_columns, 0);
        assert!(profile.tables.is_empty());
        assert!(profile.cross_table_relationships.is_empty());
    }
}
