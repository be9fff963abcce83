//! Database-specific SQL syntax
//!
//! Each supported database family gets its own set of catalog query
//! templates and identifier quoting rules. Table and column names are always
//! injected through [`Dialect::quote_identifier`]; values are always bound
//! as parameters, never interpolated.

use crate::types::DatabaseType;
use serde_json::Value;

// ============================================
// MySQL templates
// ============================================

const MYSQL_TABLES_QUERY: &str = "\
SELECT
    TABLE_NAME as table_name,
    TABLE_TYPE as table_type,
    TABLE_COMMENT as table_comment,
    TABLE_ROWS as estimated_rows
FROM INFORMATION_SCHEMA.TABLES
WHERE TABLE_SCHEMA = %s AND TABLE_TYPE = 'BASE TABLE'
ORDER BY TABLE_NAME";

const MYSQL_COLUMNS_QUERY: &str = "\
SELECT
    COLUMN_NAME as column_name,
    DATA_TYPE as data_type,
    IS_NULLABLE as is_nullable,
    CHARACTER_MAXIMUM_LENGTH as character_maximum_length,
    NUMERIC_PRECISION as numeric_precision,
    NUMERIC_SCALE as numeric_scale,
    COLUMN_DEFAULT as column_default,
    COLUMN_KEY as column_key,
    EXTRA as extra,
    ORDINAL_POSITION as ordinal_position,
    COLUMN_COMMENT as column_comment
FROM INFORMATION_SCHEMA.COLUMNS
WHERE TABLE_SCHEMA = %s AND TABLE_NAME = %s
ORDER BY ORDINAL_POSITION";

const MYSQL_PRIMARY_KEYS_QUERY: &str = "\
SELECT COLUMN_NAME as column_name
FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
WHERE TABLE_SCHEMA = %s AND TABLE_NAME = %s
AND CONSTRAINT_NAME = 'PRIMARY'
ORDER BY ORDINAL_POSITION";

const MYSQL_FOREIGN_KEYS_QUERY: &str = "\
SELECT
    COLUMN_NAME as column_name,
    REFERENCED_TABLE_NAME as referenced_table,
    REFERENCED_COLUMN_NAME as referenced_column,
    CONSTRAINT_NAME as constraint_name
FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
WHERE TABLE_SCHEMA = %s AND TABLE_NAME = %s
AND REFERENCED_TABLE_NAME IS NOT NULL";

const MYSQL_INDEXES_QUERY: &str = "\
SELECT
    INDEX_NAME as index_name,
    COLUMN_NAME as column_name,
    NON_UNIQUE as non_unique,
    SEQ_IN_INDEX as sequence_in_index
FROM INFORMATION_SCHEMA.STATISTICS
WHERE TABLE_SCHEMA = %s AND TABLE_NAME = %s
AND INDEX_NAME <> 'PRIMARY'
ORDER BY INDEX_NAME, SEQ_IN_INDEX";

// ============================================
// PostgreSQL templates
// ============================================

const POSTGRES_TABLES_QUERY: &str = "\
SELECT
    t.table_name,
    t.table_type,
    obj_description(c.oid) as table_comment
FROM information_schema.tables t
LEFT JOIN pg_class c ON c.relname = t.table_name
LEFT JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE t.table_schema = %s AND t.table_type = 'BASE TABLE'
AND (n.nspname = %s OR n.nspname IS NULL)
ORDER BY t.table_name";

const POSTGRES_COLUMNS_QUERY: &str = "\
SELECT
    c.column_name,
    c.data_type,
    c.is_nullable,
    c.character_maximum_length,
    c.numeric_precision,
    c.numeric_scale,
    c.column_default,
    c.ordinal_position,
    col_description(pgc.oid, c.ordinal_position) as column_comment
FROM information_schema.columns c
LEFT JOIN pg_class pgc ON pgc.relname = c.table_name
LEFT JOIN pg_namespace pgn ON pgn.oid = pgc.relnamespace
WHERE c.table_schema = %s AND c.table_name = %s
ORDER BY c.ordinal_position";

const POSTGRES_PRIMARY_KEYS_QUERY: &str = "\
SELECT a.attname as column_name
FROM pg_index i
JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
JOIN pg_class c ON c.oid = i.indrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE i.indisprimary AND n.nspname = %s AND c.relname = %s
ORDER BY a.attnum";

const POSTGRES_FOREIGN_KEYS_QUERY: &str = "\
SELECT
    kcu.column_name,
    ccu.table_name AS referenced_table,
    ccu.column_name AS referenced_column,
    tc.constraint_name
FROM information_schema.table_constraints AS tc
JOIN information_schema.key_column_usage AS kcu
    ON tc.constraint_name = kcu.constraint_name
JOIN information_schema.constraint_column_usage AS ccu
    ON ccu.constraint_name = tc.constraint_name
WHERE tc.constraint_type = 'FOREIGN KEY'
AND tc.table_schema = %s AND tc.table_name = %s";

const POSTGRES_INDEXES_QUERY: &str = "\
SELECT
    i.relname as index_name,
    a.attname as column_name,
    ix.indisunique as is_unique
FROM pg_class t
JOIN pg_index ix ON t.oid = ix.indrelid
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
JOIN pg_namespace n ON n.oid = t.relnamespace
WHERE n.nspname = %s AND t.relname = %s
AND NOT ix.indisprimary";

// ============================================
// MSSQL templates
// ============================================

const MSSQL_TABLES_QUERY: &str = "\
SELECT
    t.TABLE_NAME as table_name,
    t.TABLE_TYPE as table_type,
    ep.value as table_comment
FROM INFORMATION_SCHEMA.TABLES t
LEFT JOIN sys.tables st ON st.name = t.TABLE_NAME
LEFT JOIN sys.extended_properties ep ON ep.major_id = st.object_id
    AND ep.minor_id = 0 AND ep.name = 'MS_Description'
WHERE t.TABLE_CATALOG = ? AND t.TABLE_TYPE = 'BASE TABLE'
ORDER BY t.TABLE_NAME";

const MSSQL_COLUMNS_QUERY: &str = "\
SELECT
    c.COLUMN_NAME as column_name,
    c.DATA_TYPE as data_type,
    c.IS_NULLABLE as is_nullable,
    c.CHARACTER_MAXIMUM_LENGTH as character_maximum_length,
    c.NUMERIC_PRECISION as numeric_precision,
    c.NUMERIC_SCALE as numeric_scale,
    c.COLUMN_DEFAULT as column_default,
    c.ORDINAL_POSITION as ordinal_position,
    ep.value as column_comment
FROM INFORMATION_SCHEMA.COLUMNS c
LEFT JOIN sys.columns sc ON sc.name = c.COLUMN_NAME
LEFT JOIN sys.tables st ON st.name = c.TABLE_NAME
LEFT JOIN sys.extended_properties ep ON ep.major_id = st.object_id
    AND ep.minor_id = sc.column_id AND ep.name = 'MS_Description'
WHERE c.TABLE_CATALOG = ? AND c.TABLE_NAME = ?
ORDER BY c.ORDINAL_POSITION";

const MSSQL_PRIMARY_KEYS_QUERY: &str = "\
SELECT c.name as column_name
FROM sys.indexes i
JOIN sys.index_columns ic ON i.object_id = ic.object_id AND i.index_id = ic.index_id
JOIN sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id
JOIN sys.tables t ON i.object_id = t.object_id
WHERE t.name = ? AND i.is_primary_key = 1
ORDER BY ic.key_ordinal";

const MSSQL_FOREIGN_KEYS_QUERY: &str = "\
SELECT
    COL_NAME(fkc.parent_object_id, fkc.parent_column_id) as column_name,
    OBJECT_NAME(fkc.referenced_object_id) as referenced_table,
    COL_NAME(fkc.referenced_object_id, fkc.referenced_column_id) as referenced_column,
    fk.name as constraint_name
FROM sys.foreign_key_columns fkc
JOIN sys.foreign_keys fk ON fkc.constraint_object_id = fk.object_id
WHERE OBJECT_NAME(fkc.parent_object_id) = ?";

const MSSQL_INDEXES_QUERY: &str = "\
SELECT
    i.name as index_name,
    c.name as column_name,
    i.is_unique
FROM sys.indexes i
JOIN sys.index_columns ic ON i.object_id = ic.object_id AND i.index_id = ic.index_id
JOIN sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id
JOIN sys.tables t ON i.object_id = t.object_id
WHERE t.name = ? AND i.is_primary_key = 0";

/// Database-specific SQL templates and identifier quoting.
#[derive(Debug, Clone, Copy)]
pub struct Dialect {
    /// The database type this dialect was requested for
    db_type: DatabaseType,
    /// The family whose templates are actually used; unknown falls back to
    /// PostgreSQL
    effective: DatabaseType,
}

impl Dialect {
    /// Create a dialect for the given database type.
    ///
    /// Unknown types fall back to PostgreSQL syntax with a logged warning;
    /// profiling proceeds on a best-effort basis.
    pub fn new(db_type: DatabaseType) -> Self {
        let effective = match db_type {
            DatabaseType::Mysql | DatabaseType::Postgresql | DatabaseType::Mssql => db_type,
            DatabaseType::Unknown => {
                tracing::warn!(
                    db_type = %db_type,
                    "Unknown database type, falling back to PostgreSQL syntax"
                );
                DatabaseType::Postgresql
            }
        };
        Self { db_type, effective }
    }

    /// The database type this dialect was requested for.
    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Query listing all base tables with type, comment, and (MySQL only)
    /// estimated rows.
    pub fn tables_query(&self) -> &'static str {
        match self.effective {
            DatabaseType::Mysql => MYSQL_TABLES_QUERY,
            DatabaseType::Mssql => MSSQL_TABLES_QUERY,
            _ => POSTGRES_TABLES_QUERY,
        }
    }

    /// Query for one table's columns, ordered by ordinal position.
    pub fn columns_query(&self) -> &'static str {
        match self.effective {
            DatabaseType::Mysql => MYSQL_COLUMNS_QUERY,
            DatabaseType::Mssql => MSSQL_COLUMNS_QUERY,
            _ => POSTGRES_COLUMNS_QUERY,
        }
    }

    /// Query for one table's primary-key column names, in key order.
    pub fn primary_keys_query(&self) -> &'static str {
        match self.effective {
            DatabaseType::Mysql => MYSQL_PRIMARY_KEYS_QUERY,
            DatabaseType::Mssql => MSSQL_PRIMARY_KEYS_QUERY,
            _ => POSTGRES_PRIMARY_KEYS_QUERY,
        }
    }

    /// Query for one table's declared foreign keys.
    pub fn foreign_keys_query(&self) -> &'static str {
        match self.effective {
            DatabaseType::Mysql => MYSQL_FOREIGN_KEYS_QUERY,
            DatabaseType::Mssql => MSSQL_FOREIGN_KEYS_QUERY,
            _ => POSTGRES_FOREIGN_KEYS_QUERY,
        }
    }

    /// Query for one table's indexes, excluding the primary-key index.
    pub fn indexes_query(&self) -> &'static str {
        match self.effective {
            DatabaseType::Mysql => MYSQL_INDEXES_QUERY,
            DatabaseType::Mssql => MSSQL_INDEXES_QUERY,
            _ => POSTGRES_INDEXES_QUERY,
        }
    }

    /// Build a sample query. MSSQL uses `SELECT TOP n`, everything else a
    /// trailing `LIMIT n`. `table` must already be quoted.
    pub fn sample_query(&self, columns: &str, table: &str, limit: usize) -> String {
        match self.effective {
            DatabaseType::Mssql => format!("SELECT TOP {} {} FROM {}", limit, columns, table),
            _ => format!("SELECT {} FROM {} LIMIT {}", columns, table, limit),
        }
    }

    /// Build a row-count query. `table` must already be quoted.
    pub fn count_query(&self, table: &str) -> String {
        format!("SELECT COUNT(*) as row_count FROM {}", table)
    }

    /// Quote an identifier (table or column name) for this database.
    pub fn quote_identifier(&self, identifier: &str) -> String {
        match self.effective {
            DatabaseType::Mysql => format!("`{}`", identifier),
            DatabaseType::Mssql => format!("[{}]", identifier),
            _ => format!("\"{}\"", identifier),
        }
    }

    /// Positional parameters for the catalog queries above.
    ///
    /// `table_name` is `None` for the tables listing and `Some` for
    /// table-scoped queries. MySQL scopes by schema (falling back to the
    /// database name), PostgreSQL by schema (defaulting to `public`, and
    /// needing it twice for the tables query), MSSQL by catalog.
    pub fn query_params(
        &self,
        database_name: &str,
        schema_name: Option<&str>,
        table_name: Option<&str>,
    ) -> Vec<Value> {
        match self.effective {
            DatabaseType::Mssql => match table_name {
                Some(table) => vec![Value::from(table)],
                None => vec![Value::from(database_name)],
            },
            DatabaseType::Mysql => {
                let schema = schema_name.unwrap_or(database_name);
                match table_name {
                    Some(table) => vec![Value::from(schema), Value::from(table)],
                    None => vec![Value::from(schema)],
                }
            }
            _ => {
                let schema = schema_name.unwrap_or("public");
                match table_name {
                    Some(table) => vec![Value::from(schema), Value::from(table)],
                    None => vec![Value::from(schema), Value::from(schema)],
                }
            }
        }
    }

    /// The database families with native dialect support.
    pub fn supported_databases() -> &'static [DatabaseType] {
        &[
            DatabaseType::Mysql,
            DatabaseType::Postgresql,
            DatabaseType::Mssql,
        ]
    }

    pub fn is_supported(db_type: DatabaseType) -> bool {
        Self::supported_databases().contains(&db_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_per_dialect() {
        assert_eq!(
            Dialect::new(DatabaseType::Mysql).quote_identifier("patients"),
            "`patients`"
        );
        assert_eq!(
            Dialect::new(DatabaseType::Postgresql).quote_identifier("patients"),
            "\"patients\""
        );
        assert_eq!(
            Dialect::new(DatabaseType::Mssql).quote_identifier("patients"),
            "[patients]"
        );
    }

    #[test]
    fn test_sample_query_syntax() {
        let mysql = Dialect::new(DatabaseType::Mysql);
        assert_eq!(
            mysql.sample_query("*", "`patients`", 5),
            "SELECT * FROM `patients` LIMIT 5"
        );

        let mssql = Dialect::new(DatabaseType::Mssql);
        assert_eq!(
            mssql.sample_query("*", "[patients]", 5),
            "SELECT TOP 5 * FROM [patients]"
        );
    }

    #[test]
    fn test_count_query() {
        let dialect = Dialect::new(DatabaseType::Postgresql);
        assert_eq!(
            dialect.count_query("\"patients\""),
            "SELECT COUNT(*) as row_count FROM \"patients\""
        );
    }

    #[test]
    fn test_unknown_falls_back_to_postgres() {
        let dialect = Dialect::new(DatabaseType::Unknown);
        assert_eq!(dialect.db_type(), DatabaseType::Unknown);
        assert_eq!(dialect.quote_identifier("t"), "\"t\"");
        assert!(dialect.tables_query().contains("information_schema.tables"));
    }

    #[test]
    fn test_query_params() {
        let mysql = Dialect::new(DatabaseType::Mysql);
        assert_eq!(
            mysql.query_params("clinic", None, Some("patients")),
            vec![
                Value::from("clinic"),
                Value::from("patients")
            ]
        );
        assert_eq!(mysql.query_params("clinic", None, None).len(), 1);

        let postgres = Dialect::new(DatabaseType::Postgresql);
        // Tables query needs the schema twice
        assert_eq!(
            postgres.query_params("clinic", None, None),
            vec![Value::from("public"), Value::from("public")]
        );
        assert_eq!(
            postgres.query_params("clinic", Some("clinical"), Some("patients")),
            vec![Value::from("clinical"), Value::from("patients")]
        );

        let mssql = Dialect::new(DatabaseType::Mssql);
        assert_eq!(
            mssql.query_params("clinic", None, None),
            vec![Value::from("clinic")]
        );
        assert_eq!(
            mssql.query_params("clinic", None, Some("patients")),
            vec![Value::from("patients")]
        );
    }

    #[test]
    fn test_supported_databases() {
        assert!(Dialect::is_supported(DatabaseType::Mysql));
        assert!(!Dialect::is_supported(DatabaseType::Unknown));
        assert_eq!(Dialect::supported_databases().len(), 3);
    }

    #[test]
    fn test_indexes_query_excludes_primary() {
        assert!(Dialect::new(DatabaseType::Mysql)
            .indexes_query()
            .contains("INDEX_NAME <> 'PRIMARY'"));
        assert!(Dialect::new(DatabaseType::Postgresql)
            .indexes_query()
            .contains("NOT ix.indisprimary"));
        assert!(Dialect::new(DatabaseType::Mssql)
            .indexes_query()
            .contains("is_primary_key = 0"));
    }
}
