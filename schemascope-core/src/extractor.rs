//! Database metadata extraction
//!
//! [`MetadataExtractor`] produces all raw metadata for one table using the
//! dialect's catalog queries: columns, primary keys, foreign keys, indexes,
//! sample rows, and row counts, plus the derived analysis
//! (self-referencing columns, potential FK candidates) and the enriched
//! column list.
//!
//! Error policy: every catalog query is attempted independently. A failing
//! sub-query yields an empty result for that sub-query only, logged at
//! `error`, and never aborts the table. [`MetadataExtractor::complete_table_metadata`]
//! therefore always returns a well-formed record.

use crate::connector::Connector;
use crate::dialect::Dialect;
use crate::types::{
    ColumnProfile, DatabaseType, FkCandidate, ForeignKey, ForeignKeyReference, IndexInfo, Row,
    TableInfo,
};
use serde_json::Value;
use std::sync::Arc;

/// Column-name suffixes that nominate a column as a potential foreign key.
const FK_NAME_SUFFIXES: &[&str] = &["_id", "_key", "_code", "_ref", "_fk"];

/// Everything the extractor knows about one table.
#[derive(Debug, Clone)]
pub struct CompleteTableMetadata {
    pub table_name: String,
    pub columns: Vec<ColumnProfile>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexInfo>,
    pub sample_data: Vec<Row>,
    pub row_count: i64,
    pub self_referencing_columns: Vec<String>,
    pub potential_fk_candidates: Vec<FkCandidate>,
}

/// Extracts comprehensive metadata from a database schema through a
/// [`Connector`].
pub struct MetadataExtractor {
    connector: Arc<dyn Connector>,
    dialect: Dialect,
    database_name: String,
    schema_name: Option<String>,
}

impl MetadataExtractor {
    pub fn new(
        connector: Arc<dyn Connector>,
        database_name: impl Into<String>,
        schema_name: Option<String>,
    ) -> Self {
        let dialect = Dialect::new(connector.database_type());
        Self {
            connector,
            dialect,
            database_name: database_name.into(),
            schema_name,
        }
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema_name.as_deref()
    }

    pub fn database_type(&self) -> DatabaseType {
        self.connector.database_type()
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Basic information about all base tables in the database.
    pub async fn tables_info(&self) -> Vec<TableInfo> {
        let params = self
            .dialect
            .query_params(&self.database_name, self.schema_name.as_deref(), None);
        let rows = self
            .execute_safe(self.dialect.tables_query(), &params, "tables_info", None)
            .await;

        rows.iter()
            .filter_map(|row| {
                Some(TableInfo {
                    table_name: string_field(row, "table_name")?,
                    table_type: string_field(row, "table_type")
                        .unwrap_or_else(|| "BASE TABLE".to_string()),
                    table_comment: opt_string_field(row, "table_comment"),
                    estimated_rows: int_field(row, "estimated_rows"),
                })
            })
            .collect()
    }

    /// Detailed column metadata for one table, ordered by ordinal position.
    ///
    /// MySQL reports `column_key`, which pre-fills the primary-key and
    /// unique flags; other dialects leave them to enrichment.
    pub async fn column_profiles(&self, table_name: &str) -> Vec<ColumnProfile> {
        let params = self.dialect.query_params(
            &self.database_name,
            self.schema_name.as_deref(),
            Some(table_name),
        );
        let rows = self
            .execute_safe(
                self.dialect.columns_query(),
                &params,
                "column_profiles",
                Some(table_name),
            )
            .await;

        let mut columns: Vec<ColumnProfile> = rows
            .iter()
            .filter_map(|row| {
                let mut column = ColumnProfile::new(
                    string_field(row, "column_name")?,
                    string_field(row, "data_type").unwrap_or_default(),
                    int_field(row, "ordinal_position").unwrap_or(0).max(0) as u32,
                );
                column.is_nullable = parse_nullable(row.get("is_nullable"));
                column.max_length = int_field(row, "character_maximum_length");
                column.numeric_precision = int_field(row, "numeric_precision");
                column.numeric_scale = int_field(row, "numeric_scale");
                column.default_value = opt_string_field(row, "column_default");
                column.column_comment = opt_string_field(row, "column_comment");

                if let Some(key) = opt_string_field(row, "column_key") {
                    column.is_primary_key = key == "PRI";
                    column.is_unique = key == "PRI" || key == "UNI";
                }
                Some(column)
            })
            .collect();

        columns.sort_by_key(|c| c.ordinal_position);
        normalize_ordinals(&mut columns);
        columns
    }

    /// Primary-key column names for one table, in key order.
    pub async fn primary_keys(&self, table_name: &str) -> Vec<String> {
        let params = self.dialect.query_params(
            &self.database_name,
            self.schema_name.as_deref(),
            Some(table_name),
        );
        let rows = self
            .execute_safe(
                self.dialect.primary_keys_query(),
                &params,
                "primary_keys",
                Some(table_name),
            )
            .await;

        rows.iter()
            .filter_map(|row| string_field(row, "column_name"))
            .collect()
    }

    /// Declared foreign keys for one table.
    pub async fn foreign_keys(&self, table_name: &str) -> Vec<ForeignKey> {
        let params = self.dialect.query_params(
            &self.database_name,
            self.schema_name.as_deref(),
            Some(table_name),
        );
        let rows = self
            .execute_safe(
                self.dialect.foreign_keys_query(),
                &params,
                "foreign_keys",
                Some(table_name),
            )
            .await;

        rows.iter()
            .filter_map(|row| {
                Some(ForeignKey {
                    column_name: string_field(row, "column_name")?,
                    referenced_table: string_field(row, "referenced_table")?,
                    referenced_column: string_field(row, "referenced_column")?,
                    constraint_name: string_field(row, "constraint_name").unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Index membership rows for one table, excluding the primary-key index.
    pub async fn indexes(&self, table_name: &str) -> Vec<IndexInfo> {
        let params = self.dialect.query_params(
            &self.database_name,
            self.schema_name.as_deref(),
            Some(table_name),
        );
        let rows = self
            .execute_safe(
                self.dialect.indexes_query(),
                &params,
                "indexes",
                Some(table_name),
            )
            .await;

        rows.iter()
            .filter_map(|row| {
                Some(IndexInfo {
                    index_name: string_field(row, "index_name")?,
                    column_name: string_field(row, "column_name")?,
                    is_unique: parse_unique_flag(row),
                })
            })
            .collect()
    }

    /// Up to `limit` sample rows from one table. Returns empty on error or
    /// when sampling is disabled (`limit == 0`).
    pub async fn sample_data(&self, table_name: &str, limit: usize) -> Vec<Row> {
        if limit == 0 {
            return Vec::new();
        }
        let quoted = self.quoted_table_name(table_name);
        let query = self.dialect.sample_query("*", &quoted, limit);
        let mut rows = self
            .execute_safe(&query, &[], "sample_data", Some(table_name))
            .await;
        rows.truncate(limit);
        rows
    }

    /// Row count for one table. Returns 0 on error.
    pub async fn row_count(&self, table_name: &str) -> i64 {
        let quoted = self.quoted_table_name(table_name);
        let query = self.dialect.count_query(&quoted);
        let rows = self
            .execute_safe(&query, &[], "row_count", Some(table_name))
            .await;

        rows.first()
            .and_then(|row| {
                int_field(row, "row_count").or_else(|| row.values().next().and_then(Value::as_i64))
            })
            .unwrap_or(0)
    }

    /// FK columns of `table_name` that reference the table itself.
    pub fn find_self_referencing_columns(
        foreign_keys: &[ForeignKey],
        table_name: &str,
    ) -> Vec<String> {
        foreign_keys
            .iter()
            .filter(|fk| fk.referenced_table == table_name)
            .map(|fk| fk.column_name.clone())
            .collect()
    }

    /// Columns whose names suggest a foreign key, among those not already a
    /// PK or declared FK.
    pub fn find_potential_fk_candidates(columns: &[ColumnProfile]) -> Vec<FkCandidate> {
        columns
            .iter()
            .filter(|c| !c.is_foreign_key && !c.is_primary_key)
            .filter_map(|column| {
                let lower = column.name.to_lowercase();
                FK_NAME_SUFFIXES
                    .iter()
                    .find(|suffix| lower.ends_with(*suffix))
                    .map(|suffix| FkCandidate {
                        column_name: column.name.clone(),
                        data_type: column.data_type.clone(),
                        reason: format!("Matches pattern: *{}", suffix),
                    })
            })
            .collect()
    }

    /// Fold key, index, and sample information into the column profiles.
    pub fn enrich_column_profiles(
        mut columns: Vec<ColumnProfile>,
        primary_keys: &[String],
        foreign_keys: &[ForeignKey],
        indexes: &[IndexInfo],
        sample_data: &[Row],
    ) -> Vec<ColumnProfile> {
        for column in &mut columns {
            if primary_keys.iter().any(|pk| pk == &column.name) {
                column.is_primary_key = true;
                column.is_unique = true;
                column.is_nullable = false;
            }

            if let Some(fk) = foreign_keys.iter().find(|fk| fk.column_name == column.name) {
                column.is_foreign_key = true;
                column.foreign_key_reference = Some(ForeignKeyReference {
                    referenced_table: fk.referenced_table.clone(),
                    referenced_column: fk.referenced_column.clone(),
                    constraint_name: fk.constraint_name.clone(),
                });
            }

            for index in indexes.iter().filter(|i| i.column_name == column.name) {
                column.is_indexed = true;
                if index.is_unique {
                    column.is_unique = true;
                }
            }

            if !sample_data.is_empty() {
                column.sample_values = sample_data
                    .iter()
                    .take(5)
                    .map(|row| row.get(&column.name).cloned().unwrap_or(Value::Null))
                    .collect();
            }
        }
        columns
    }

    /// Complete metadata for a single table.
    ///
    /// Individual sub-query failures degrade to empty results; the returned
    /// record is always well-formed.
    pub async fn complete_table_metadata(
        &self,
        table_name: &str,
        sample_limit: usize,
    ) -> CompleteTableMetadata {
        let columns = self.column_profiles(table_name).await;
        let primary_keys = self.primary_keys(table_name).await;
        let foreign_keys = self.foreign_keys(table_name).await;
        let indexes = self.indexes(table_name).await;
        let sample_data = self.sample_data(table_name, sample_limit).await;
        let row_count = self.row_count(table_name).await;

        let self_referencing_columns =
            Self::find_self_referencing_columns(&foreign_keys, table_name);

        let columns = Self::enrich_column_profiles(
            columns,
            &primary_keys,
            &foreign_keys,
            &indexes,
            &sample_data,
        );
        let potential_fk_candidates = Self::find_potential_fk_candidates(&columns);

        CompleteTableMetadata {
            table_name: table_name.to_string(),
            columns,
            primary_keys,
            foreign_keys,
            indexes,
            sample_data,
            row_count,
            self_referencing_columns,
            potential_fk_candidates,
        }
    }

    /// Quoted table name, prefixed with the quoted schema for databases
    /// that address tables through schemas.
    pub fn quoted_table_name(&self, table_name: &str) -> String {
        let quoted = self.dialect.quote_identifier(table_name);
        match (&self.schema_name, self.connector.database_type()) {
            (Some(schema), db_type) if db_type != DatabaseType::Mysql => {
                format!("{}.{}", self.dialect.quote_identifier(schema), quoted)
            }
            _ => quoted,
        }
    }

    /// Execute a query, lowercasing returned column names and substituting
    /// an empty result on failure.
    async fn execute_safe(
        &self,
        query: &str,
        params: &[Value],
        operation: &str,
        table_name: Option<&str>,
    ) -> Vec<Row> {
        tracing::debug!(operation, table = table_name.unwrap_or("-"), "Executing metadata query");
        match self.connector.execute_query(query, params).await {
            Ok(rows) => rows.into_iter().map(lowercase_keys).collect(),
            Err(e) => {
                tracing::error!(
                    operation,
                    table = table_name.unwrap_or("-"),
                    error = %e,
                    "Metadata query failed, substituting empty result"
                );
                Vec::new()
            }
        }
    }
}

// ============================================
// Row parsing helpers
// ============================================

fn lowercase_keys(row: Row) -> Row {
    row.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect()
}

fn string_field(row: &Row, key: &str) -> Option<String> {
    match row.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

fn opt_string_field(row: &Row, key: &str) -> Option<String> {
    string_field(row, key).filter(|s| !s.is_empty())
}

fn int_field(row: &Row, key: &str) -> Option<i64> {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

/// Nullability flags arrive as "YES"/"NO" strings or booleans depending on
/// the dialect.
fn parse_nullable(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("yes"),
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

/// Index uniqueness arrives as `non_unique` (MySQL) or `is_unique`
/// (PostgreSQL, MSSQL).
fn parse_unique_flag(row: &Row) -> bool {
    if let Some(non_unique) = row.get("non_unique") {
        return !truthy(non_unique);
    }
    row.get("is_unique").map(truthy).unwrap_or(false)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        Value::String(s) => {
            let s = s.to_ascii_lowercase();
            s == "1" || s == "true" || s == "t" || s == "yes"
        }
        _ => false,
    }
}

/// Catalog rows occasionally arrive without ordinal positions; renumber so
/// positions stay a contiguous 1..N block.
fn normalize_ordinals(columns: &mut [ColumnProfile]) {
    let contiguous = columns
        .iter()
        .enumerate()
        .all(|(i, c)| c.ordinal_position == (i + 1) as u32);
    if !contiguous {
        for (i, column) in columns.iter_mut().enumerate() {
            column.ordinal_position = (i + 1) as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::StaticConnector;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn mysql_columns() -> Vec<Row> {
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
                ("character_maximum_length", json!(255)),
                ("column_key", json!("UNI")),
                ("ordinal_position", json!(2)),
            ]),
            row(&[
                ("column_name", json!("provider_ref")),
                ("data_type", json!("int")),
                ("is_nullable", json!("YES")),
                ("ordinal_position", json!(3)),
            ]),
        ]
    }

    fn extractor(connector: StaticConnector) -> MetadataExtractor {
        MetadataExtractor::new(Arc::new(connector), "clinic", None)
    }

    #[tokio::test]
    async fn test_column_profiles_with_mysql_keys() {
        let connector = StaticConnector::new(DatabaseType::Mysql)
            .with_response("INFORMATION_SCHEMA.COLUMNS", mysql_columns());
        let extractor = extractor(connector);

        let columns = extractor.column_profiles("patients").await;
        assert_eq!(columns.len(), 3);
        assert!(columns[0].is_primary_key);
        assert!(columns[0].is_unique);
        assert!(!columns[0].is_nullable);
        assert!(!columns[1].is_primary_key);
        assert!(columns[1].is_unique);
        assert_eq!(columns[1].max_length, Some(255));
        assert_eq!(columns[2].ordinal_position, 3);
    }

    #[tokio::test]
    async fn test_failed_subquery_yields_empty() {
        let connector = StaticConnector::new(DatabaseType::Mysql)
            .failing_on("INFORMATION_SCHEMA.COLUMNS");
        let extractor = extractor(connector);

        let columns = extractor.column_profiles("patients").await;
        assert!(columns.is_empty());
    }

    #[tokio::test]
    async fn test_row_count_and_default() {
        let connector = StaticConnector::new(DatabaseType::Mysql)
            .with_response("COUNT(*)", vec![row(&[("row_count", json!(1200))])]);
        let extractor = extractor(connector);
        assert_eq!(extractor.row_count("patients").await, 1200);

        let failing = StaticConnector::new(DatabaseType::Mysql).failing_on("COUNT(*)");
        let extractor = MetadataExtractor::new(Arc::new(failing), "clinic", None);
        assert_eq!(extractor.row_count("patients").await, 0);
    }

    #[tokio::test]
    async fn test_sample_data_limit_zero() {
        let connector = StaticConnector::new(DatabaseType::Mysql)
            .with_response("SELECT *", vec![row(&[("id", json!(1))])]);
        let extractor = extractor(connector);
        assert!(extractor.sample_data("patients", 0).await.is_empty());
    }

    #[test]
    fn test_potential_fk_candidates() {
        let mut columns = vec![
            ColumnProfile::new("id", "int", 1),
            ColumnProfile::new("provider_ref", "int", 2),
            ColumnProfile::new("status_code", "varchar", 3),
            ColumnProfile::new("notes", "text", 4),
            ColumnProfile::new("Parent_ID", "int", 5),
        ];
        columns[0].is_primary_key = true;

        let candidates = MetadataExtractor::find_potential_fk_candidates(&columns);
        let names: Vec<&str> = candidates.iter().map(|c| c.column_name.as_str()).collect();
        assert_eq!(names, vec!["provider_ref", "status_code", "Parent_ID"]);
        assert!(candidates[0].reason.contains("_ref"));
    }

    #[test]
    fn test_self_referencing_columns() {
        let fks = vec![
            ForeignKey {
                column_name: "parent_id".to_string(),
                referenced_table: "categories".to_string(),
                referenced_column: "id".to_string(),
                constraint_name: "fk_parent".to_string(),
            },
            ForeignKey {
                column_name: "owner_id".to_string(),
                referenced_table: "users".to_string(),
                referenced_column: "id".to_string(),
                constraint_name: "fk_owner".to_string(),
            },
        ];
        let self_refs = MetadataExtractor::find_self_referencing_columns(&fks, "categories");
        assert_eq!(self_refs, vec!["parent_id"]);
    }

    #[test]
    fn test_enrich_marks_flags_and_samples() {
        let columns = vec![
            ColumnProfile::new("id", "int", 1),
            ColumnProfile::new("patient_id", "int", 2),
            ColumnProfile::new("email", "varchar", 3),
        ];
        let primary_keys = vec!["id".to_string()];
        let foreign_keys = vec![ForeignKey {
            column_name: "patient_id".to_string(),
            referenced_table: "patients".to_string(),
            referenced_column: "id".to_string(),
            constraint_name: "fk_patient".to_string(),
        }];
        let indexes = vec![IndexInfo {
            index_name: "ix_email".to_string(),
            column_name: "email".to_string(),
            is_unique: true,
        }];
        let samples = vec![
            row(&[("id", json!(1)), ("patient_id", json!(9)), ("email", json!("a@b.c"))]),
            row(&[("id", json!(2)), ("patient_id", json!(9))]),
        ];

        let enriched = MetadataExtractor::enrich_column_profiles(
            columns,
            &primary_keys,
            &foreign_keys,
            &indexes,
            &samples,
        );

        assert!(enriched[0].is_primary_key && enriched[0].is_unique && !enriched[0].is_nullable);
        assert!(enriched[1].is_foreign_key);
        assert_eq!(
            enriched[1].foreign_key_reference.as_ref().map(|r| r.referenced_table.as_str()),
            Some("patients")
        );
        assert!(enriched[2].is_indexed && enriched[2].is_unique);
        // Sample values preserve row order and keep missing cells as null
        assert_eq!(enriched[2].sample_values, vec![json!("a@b.c"), Value::Null]);
    }

    #[tokio::test]
    async fn test_complete_metadata_always_well_formed() {
        let connector = StaticConnector::new(DatabaseType::Mysql)
            .failing_on("INFORMATION_SCHEMA.COLUMNS")
            .failing_on("KEY_COLUMN_USAGE")
            .failing_on("STATISTICS")
            .failing_on("COUNT(*)")
            .failing_on("SELECT *");
        let extractor = extractor(connector);

        let metadata = extractor.complete_table_metadata("broken", 5).await;
        assert_eq!(metadata.table_name, "broken");
        assert!(metadata.columns.is_empty());
        assert!(metadata.primary_keys.is_empty());
        assert_eq!(metadata.row_count, 0);
        assert!(metadata.potential_fk_candidates.is_empty());
    }

    #[test]
    fn test_ordinal_normalization() {
        let mut columns = vec![
            ColumnProfile::new("a", "int", 0),
            ColumnProfile::new("b", "int", 0),
        ];
        normalize_ordinals(&mut columns);
        assert_eq!(columns[0].ordinal_position, 1);
        assert_eq!(columns[1].ordinal_position, 2);
    }

    #[test]
    fn test_parse_helpers() {
        assert!(parse_nullable(Some(&json!("YES"))));
        assert!(!parse_nullable(Some(&json!("NO"))));
        assert!(parse_nullable(Some(&json!(true))));

        let mysql_row = row(&[("non_unique", json!(0))]);
        assert!(parse_unique_flag(&mysql_row));
        let pg_row = row(&[("is_unique", json!(true))]);
        assert!(parse_unique_flag(&pg_row));
        let missing = row(&[]);
        assert!(!parse_unique_flag(&missing));
    }

    #[tokio::test]
    async fn test_quoted_table_name_with_schema() {
        let connector = StaticConnector::new(DatabaseType::Postgresql);
        let extractor =
            MetadataExtractor::new(Arc::new(connector), "clinic", Some("clinical".to_string()));
        assert_eq!(extractor.quoted_table_name("patients"), "\"clinical\".\"patients\"");

        let mysql = StaticConnector::new(DatabaseType::Mysql);
        let extractor =
            MetadataExtractor::new(Arc::new(mysql), "clinic", Some("clinical".to_string()));
        assert_eq!(extractor.quoted_table_name("patients"), "`patients`");
    }
}
