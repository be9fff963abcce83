//! Semantic column enrichment
//!
//! Annotates minimal column summaries with key phrases, an entity type, and
//! semantic tags suitable for embedding pipelines. The pass is deterministic
//! and stateless: it works purely from the column's name, type, and key
//! role, and never queries the database.
//!
//! Rules come from two JSON configs: key-phrase extraction rules (healthcare
//! domain applied before the general domain) and entity-type classification
//! configs with confidence scoring.

use crate::error::{Error, Result};
use crate::types::format_timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

const DEFAULT_KEY_PHRASES_JSON: &str = include_str!("../../config/key_phrases.json");
const DEFAULT_ENTITY_TYPES_JSON: &str = include_str!("../../config/entity_types.json");

/// Entity confidence below this threshold is discarded.
const MIN_ENTITY_CONFIDENCE: f64 = 0.4;

// ============================================
// Rule configs
// ============================================

/// One key-phrase extraction rule. A rule fires when *all* provided pattern
/// lists match (case-insensitive substring for the field name, substring for
/// the data type).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhraseRule {
    #[serde(default)]
    pub field_name_patterns: Vec<String>,
    #[serde(default)]
    pub data_type_patterns: Vec<String>,
    #[serde(default)]
    pub key_phrases: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ExtractionRules {
    /// Healthcare rules are applied first, so their phrases survive
    /// truncation preferentially
    #[serde(default)]
    healthcare_domain: BTreeMap<String, PhraseRule>,
    #[serde(default)]
    general_domain: BTreeMap<String, PhraseRule>,
}

#[derive(Debug, Clone, Deserialize)]
struct PhraseSelectionRules {
    #[serde(default = "default_max_phrases")]
    max_phrases_per_field: usize,
}

fn default_max_phrases() -> usize {
    5
}

impl Default for PhraseSelectionRules {
    fn default() -> Self {
        Self {
            max_phrases_per_field: default_max_phrases(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct KeyPhrasesConfig {
    #[serde(default)]
    key_phrase_extraction_rules: ExtractionRules,
    #[serde(default)]
    phrase_selection_rules: PhraseSelectionRules,
}

/// Hints about how an entity's data usually looks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataCharacteristics {
    #[serde(default)]
    pub typically_primary_key: bool,
    #[serde(default)]
    pub often_foreign_key: bool,
    #[serde(default)]
    pub text_format: bool,
    #[serde(default)]
    pub usually_numeric: bool,
    #[serde(default)]
    pub temporal_data: bool,
}

/// One entity classification config.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfig {
    /// The entity type emitted when this config wins, e.g. "PATIENT_ID"
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub field_indicators: Vec<String>,
    #[serde(default)]
    pub data_characteristics: DataCharacteristics,
    #[serde(default)]
    pub semantic_tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EntityCategories {
    #[serde(default)]
    healthcare: BTreeMap<String, EntityConfig>,
    #[serde(default)]
    general: BTreeMap<String, EntityConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EntityTypesConfig {
    #[serde(default)]
    entity_types: EntityCategories,
}

// ============================================
// Input / output shapes
// ============================================

/// Minimal column description fed to the enricher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    /// Declared data type, e.g. "varchar"
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    /// "PK", "FK", or absent
    #[serde(default)]
    pub key_type: Option<String>,
}

/// A column summary annotated with semantic information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub key_type: Option<String>,
    /// Deduplicated phrases, most domain-specific first
    pub key_phrases: Vec<String>,
    pub entity_type: Option<String>,
    /// Confidence in [0, 1]; 0.0 when no entity was assigned
    pub entity_confidence: f64,
    pub semantic_tags: Vec<String>,
    pub table_name: Option<String>,
    pub full_identifier: String,
    pub enrichment_timestamp: String,
}

/// Aggregate statistics over one table's enriched columns.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentSummary {
    pub total_columns: usize,
    pub columns_with_key_phrases: usize,
    pub columns_with_entity_types: usize,
    pub unique_entity_types: usize,
    pub avg_entity_confidence: f64,
    pub total_key_phrases: usize,
    pub unique_semantic_tags: usize,
}

/// Enrichment result for one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableEnrichment {
    pub table: String,
    pub total_columns: usize,
    pub enriched_columns: Vec<EnrichedColumn>,
    pub enrichment_summary: EnrichmentSummary,
    pub enrichment_timestamp: String,
}

// ============================================
// Enricher
// ============================================

/// Annotates columns with key phrases and entity types from rule configs.
pub struct Enricher {
    key_phrases: KeyPhrasesConfig,
    entity_types: EntityTypesConfig,
}

impl Enricher {
    /// Build an enricher from the bundled default rule sets.
    pub fn new() -> Self {
        // The bundled configs are compiled in and validated by tests
        let key_phrases = serde_json::from_str(DEFAULT_KEY_PHRASES_JSON).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Bundled key-phrase config invalid, enrichment disabled");
            KeyPhrasesConfig::default()
        });
        let entity_types = serde_json::from_str(DEFAULT_ENTITY_TYPES_JSON).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Bundled entity-type config invalid, enrichment disabled");
            EntityTypesConfig::default()
        });
        Self {
            key_phrases,
            entity_types,
        }
    }

    /// Build an enricher from explicit config files.
    pub fn from_files(key_phrases_path: &Path, entity_types_path: &Path) -> Result<Self> {
        let key_phrases = std::fs::read_to_string(key_phrases_path).map_err(|e| {
            Error::Config(format!("failed to read {:?}: {}", key_phrases_path, e))
        })?;
        let entity_types = std::fs::read_to_string(entity_types_path).map_err(|e| {
            Error::Config(format!("failed to read {:?}: {}", entity_types_path, e))
        })?;
        Self::from_json(&key_phrases, &entity_types)
    }

    pub fn from_json(key_phrases: &str, entity_types: &str) -> Result<Self> {
        Ok(Self {
            key_phrases: serde_json::from_str(key_phrases)
                .map_err(|e| Error::Config(format!("invalid key-phrase config: {}", e)))?,
            entity_types: serde_json::from_str(entity_types)
                .map_err(|e| Error::Config(format!("invalid entity-type config: {}", e)))?,
        })
    }

    /// Enrich a single column.
    pub fn enrich_column(&self, column: &ColumnSummary, table_name: Option<&str>) -> EnrichedColumn {
        let key_phrases = self.extract_key_phrases(column);
        let (entity_type, entity_confidence, semantic_tags) = self.classify_entity(column);

        let full_identifier = match table_name {
            Some(table) => format!("{}.{}", table, column.name),
            None => column.name.clone(),
        };

        EnrichedColumn {
            name: column.name.clone(),
            data_type: column.data_type.clone(),
            nullable: column.nullable,
            key_type: column.key_type.clone(),
            key_phrases,
            entity_type,
            entity_confidence,
            semantic_tags,
            table_name: table_name.map(str::to_string),
            full_identifier,
            enrichment_timestamp: format_timestamp(Utc::now()),
        }
    }

    /// Enrich all columns of one table and summarize the result.
    pub fn enrich_table(&self, table_name: &str, columns: &[ColumnSummary]) -> TableEnrichment {
        let enriched_columns: Vec<EnrichedColumn> = columns
            .iter()
            .map(|c| self.enrich_column(c, Some(table_name)))
            .collect();

        TableEnrichment {
            table: table_name.to_string(),
            total_columns: enriched_columns.len(),
            enrichment_summary: summarize(&enriched_columns),
            enriched_columns,
            enrichment_timestamp: format_timestamp(Utc::now()),
        }
    }

    /// Enrich the columns of a profiled table.
    ///
    /// Key roles come from the profile's flags: primary key wins over
    /// foreign key when a column is both.
    pub fn enrich_table_profile(&self, table: &crate::types::TableProfile) -> TableEnrichment {
        let columns: Vec<ColumnSummary> = table
            .columns
            .iter()
            .map(|c| ColumnSummary {
                name: c.name.clone(),
                data_type: c.data_type.clone(),
                nullable: c.is_nullable,
                key_type: if c.is_primary_key {
                    Some("PK".to_string())
                } else if c.is_foreign_key {
                    Some("FK".to_string())
                } else {
                    None
                },
            })
            .collect();
        self.enrich_table(&table.name, &columns)
    }

    /// Enrich every table of a schema profile, in table order.
    pub fn enrich_schema(&self, profile: &crate::types::SchemaProfile) -> Vec<TableEnrichment> {
        profile
            .tables
            .iter()
            .map(|t| self.enrich_table_profile(t))
            .collect()
    }

    /// Apply healthcare then general phrase rules, deduplicate preserving
    /// order, and truncate to the configured maximum.
    fn extract_key_phrases(&self, column: &ColumnSummary) -> Vec<String> {
        let rules = &self.key_phrases.key_phrase_extraction_rules;
        let mut phrases = Vec::new();

        for rule in rules
            .healthcare_domain
            .values()
            .chain(rules.general_domain.values())
        {
            if rule_matches(column, rule) {
                phrases.extend(rule.key_phrases.iter().cloned());
            }
        }

        let mut seen = HashSet::new();
        let mut unique: Vec<String> = Vec::new();
        for phrase in phrases {
            if seen.insert(phrase.to_lowercase()) {
                unique.push(phrase);
            }
        }
        unique.truncate(self.key_phrases.phrase_selection_rules.max_phrases_per_field);
        unique
    }

    /// Score every entity config and keep the best one above the confidence
    /// floor.
    fn classify_entity(&self, column: &ColumnSummary) -> (Option<String>, f64, Vec<String>) {
        let categories = &self.entity_types.entity_types;

        let mut best: Option<&EntityConfig> = None;
        let mut best_confidence = 0.0;

        for config in categories
            .healthcare
            .values()
            .chain(categories.general.values())
        {
            let confidence = entity_confidence(column, config);
            if confidence > best_confidence {
                best_confidence = confidence;
                best = Some(config);
            }
        }

        match best {
            Some(config) if best_confidence >= MIN_ENTITY_CONFIDENCE => (
                Some(config.entity_type.clone()),
                best_confidence,
                config.semantic_tags.clone(),
            ),
            _ => (None, 0.0, Vec::new()),
        }
    }
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new()
    }
}

/// All provided pattern lists must match for the rule to fire.
fn rule_matches(column: &ColumnSummary, rule: &PhraseRule) -> bool {
    let name_lower = column.name.to_lowercase();
    let type_lower = column.data_type.to_lowercase();

    if !rule.field_name_patterns.is_empty()
        && !rule
            .field_name_patterns
            .iter()
            .any(|p| name_lower.contains(&p.to_lowercase()))
    {
        return false;
    }
    if !rule.data_type_patterns.is_empty()
        && !rule
            .data_type_patterns
            .iter()
            .any(|p| type_lower.contains(&p.to_lowercase()))
    {
        return false;
    }
    true
}

/// Confidence scoring: field indicator +0.6, matching key role +0.4,
/// matching type hint +0.2, clamped to 1.0.
fn entity_confidence(column: &ColumnSummary, config: &EntityConfig) -> f64 {
    let name_lower = column.name.to_lowercase();
    let type_lower = column.data_type.to_lowercase();
    let chars = &config.data_characteristics;
    let mut confidence: f64 = 0.0;

    if config
        .field_indicators
        .iter()
        .any(|indicator| name_lower.contains(&indicator.to_lowercase()))
    {
        confidence += 0.6;
    }

    match column.key_type.as_deref() {
        Some("PK") if chars.typically_primary_key => confidence += 0.4,
        Some("FK") if chars.often_foreign_key => confidence += 0.4,
        _ => {}
    }

    let is_text = matches!(type_lower.as_str(), "varchar" | "text");
    let is_numeric = matches!(type_lower.as_str(), "int" | "bigint");
    let is_temporal = matches!(type_lower.as_str(), "date" | "datetime" | "timestamp");
    if (is_text && chars.text_format)
        || (is_numeric && chars.usually_numeric)
        || (is_temporal && chars.temporal_data)
    {
        confidence += 0.2;
    }

    confidence.min(1.0)
}

fn summarize(columns: &[EnrichedColumn]) -> EnrichmentSummary {
    let with_entities: Vec<&EnrichedColumn> =
        columns.iter().filter(|c| c.entity_type.is_some()).collect();
    let unique_entity_types: HashSet<&str> = with_entities
        .iter()
        .filter_map(|c| c.entity_type.as_deref())
        .collect();
    let unique_semantic_tags: HashSet<&str> = columns
        .iter()
        .flat_map(|c| c.semantic_tags.iter().map(String::as_str))
        .collect();

    let avg_entity_confidence = if columns.is_empty() {
        0.0
    } else {
        columns.iter().map(|c| c.entity_confidence).sum::<f64>() / columns.len() as f64
    };

    EnrichmentSummary {
        total_columns: columns.len(),
        columns_with_key_phrases: columns.iter().filter(|c| !c.key_phrases.is_empty()).count(),
        columns_with_entity_types: with_entities.len(),
        unique_entity_types: unique_entity_types.len(),
        avg_entity_confidence,
        total_key_phrases: columns.iter().map(|c| c.key_phrases.len()).sum(),
        unique_semantic_tags: unique_semantic_tags.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, data_type: &str, key_type: Option<&str>) -> ColumnSummary {
        ColumnSummary {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: key_type != Some("PK"),
            key_type: key_type.map(str::to_string),
        }
    }

    #[test]
    fn test_email_column_enrichment() {
        let enricher = Enricher::new();
        let enriched = enricher.enrich_column(&column("email", "varchar", None), Some("patients"));

        assert!(enriched.key_phrases.contains(&"email address".to_string()));
        assert_eq!(enriched.entity_type.as_deref(), Some("EMAIL_ADDRESS"));
        // Field indicator (0.6) + text format (0.2)
        assert!((enriched.entity_confidence - 0.8).abs() < 1e-9);
        assert!(enriched.semantic_tags.contains(&"pii".to_string()));
        assert_eq!(enriched.full_identifier, "patients.email");
    }

    #[test]
    fn test_patient_pk_scores_highest() {
        let enricher = Enricher::new();
        let enriched = enricher.enrich_column(&column("patient_id", "int", Some("PK")), None);

        assert_eq!(enriched.entity_type.as_deref(), Some("PATIENT_ID"));
        // 0.6 + 0.4 + 0.2, clamped to 1.0
        assert!((enriched.entity_confidence - 1.0).abs() < 1e-9);
        assert!(enriched.key_phrases.contains(&"patient identifier".to_string()));
    }

    #[test]
    fn test_fk_affinity() {
        let enricher = Enricher::new();
        let enriched = enricher.enrich_column(&column("provider_id", "int", Some("FK")), None);
        assert_eq!(enriched.entity_type.as_deref(), Some("PROVIDER_ID"));
        assert!((enriched.entity_confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_confidence_yields_no_entity() {
        let enricher = Enricher::new();
        // Nothing in the configs points at this column; only a type hint
        // could match, and 0.2 is below the floor
        let enriched = enricher.enrich_column(&column("notes", "text", None), None);
        assert!(enriched.entity_type.is_none());
        assert_eq!(enriched.entity_confidence, 0.0);
        assert!(enriched.semantic_tags.is_empty());
    }

    #[test]
    fn test_healthcare_phrases_come_first() {
        let enricher = Enricher::new();
        // "patient_email" hits both the healthcare patient rule and the
        // general email rule; healthcare phrases must lead
        let enriched = enricher.enrich_column(&column("patient_email", "varchar", None), None);
        assert_eq!(enriched.key_phrases[0], "patient identifier");
        assert!(enriched.key_phrases.len() <= 5);
        assert!(enriched.key_phrases.contains(&"email address".to_string()));
    }

    #[test]
    fn test_phrase_dedup_and_truncation() {
        let key_phrases = r#"{
            "key_phrase_extraction_rules": {
                "healthcare_domain": {
                    "a": {"field_name_patterns": ["x"], "key_phrases": ["one", "two", "three"]},
                    "b": {"field_name_patterns": ["x"], "key_phrases": ["Two", "four", "five", "six", "seven"]}
                },
                "general_domain": {}
            },
            "phrase_selection_rules": {"max_phrases_per_field": 5}
        }"#;
        let enricher = Enricher::from_json(key_phrases, r#"{"entity_types": {}}"#).unwrap();
        let enriched = enricher.enrich_column(&column("x_value", "varchar", None), None);
        // "Two" deduplicates against "two" case-insensitively, then the
        // list truncates at 5
        assert_eq!(enriched.key_phrases, vec!["one", "two", "three", "four", "five"]);
    }

    #[test]
    fn test_rule_requires_all_provided_patterns() {
        let enricher = Enricher::new();
        // audit_fields needs both a name and a temporal type
        let as_date = enricher.enrich_column(&column("created_at", "datetime", None), None);
        assert!(as_date.key_phrases.contains(&"audit timestamp".to_string()));

        let as_text = enricher.enrich_column(&column("created_by", "varchar", None), None);
        assert!(!as_text.key_phrases.contains(&"audit timestamp".to_string()));
    }

    #[test]
    fn test_table_enrichment_summary() {
        let enricher = Enricher::new();
        let columns = vec![
            column("patient_id", "int", Some("PK")),
            column("email", "varchar", None),
            column("notes", "text", None),
        ];
        let result = enricher.enrich_table("patients", &columns);

        assert_eq!(result.total_columns, 3);
        assert_eq!(result.enrichment_summary.columns_with_entity_types, 2);
        assert_eq!(result.enrichment_summary.unique_entity_types, 2);
        assert!(result.enrichment_summary.avg_entity_confidence > 0.0);
        assert_eq!(result.table, "patients");
    }

    #[test]
    fn test_enrich_table_profile_maps_key_roles() {
        use crate::types::{ColumnProfile, TableProfile};

        let mut table = TableProfile::minimal("patient", None);
        let mut id = ColumnProfile::new("patient_id", "int", 1);
        id.is_primary_key = true;
        id.is_nullable = false;
        let mut provider = ColumnProfile::new("provider_id", "int", 2);
        provider.is_foreign_key = true;
        table.columns = vec![id, provider, ColumnProfile::new("email", "varchar", 3)];

        let enricher = Enricher::new();
        let result = enricher.enrich_table_profile(&table);

        assert_eq!(result.enriched_columns[0].key_type.as_deref(), Some("PK"));
        assert_eq!(result.enriched_columns[0].entity_type.as_deref(), Some("PATIENT_ID"));
        assert_eq!(result.enriched_columns[1].key_type.as_deref(), Some("FK"));
        assert_eq!(result.enriched_columns[2].key_type, None);
    }

    #[test]
    fn test_deterministic() {
        let enricher = Enricher::new();
        let input = column("patient_email", "varchar", None);
        let first = enricher.enrich_column(&input, Some("t"));
        for _ in 0..5 {
            let again = enricher.enrich_column(&input, Some("t"));
            assert_eq!(again.key_phrases, first.key_phrases);
            assert_eq!(again.entity_type, first.entity_type);
            assert_eq!(again.entity_confidence, first.entity_confidence);
        }
    }
}
