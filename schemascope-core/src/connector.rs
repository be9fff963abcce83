//! Database connector contract
//!
//! The profiling core never talks to a driver directly: every query goes
//! through the [`Connector`] trait. Identifiers are injected into SQL via the
//! dialect's quoting rules; values are always passed as bindings, never
//! interpolated.
//!
//! Two implementations ship with the library:
//! - [`StaticConnector`] — a scripted connector that answers queries from
//!   canned rows, used by tests and examples.
//! - [`SqliteConnector`] — a real connector over an embedded SQLite
//!   database, used for local smoke runs and integration tests.

use crate::error::{Error, Result};
use crate::types::{DatabaseType, Row};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

/// Contract the profiling core consumes.
///
/// Implementations are expected to handle their own retry policy for
/// transient failures; the core treats a returned error as final for the
/// sub-query that issued it.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The database family this connector talks to. Drives dialect selection.
    fn database_type(&self) -> DatabaseType;

    /// Execute a query with positional bindings and return all rows.
    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Whether the backing connection is currently usable.
    async fn health_check(&self) -> bool;
}

// ============================================
// Scripted connector
// ============================================

/// A connector that answers queries from canned responses.
///
/// A response is keyed by one or more needles; every needle must either be
/// a substring of the incoming SQL or equal one of the bound string
/// parameters (catalog queries carry the table name as a binding, not in the
/// SQL text). First matching response wins. Queries matching a registered
/// failure return a connector error; anything unmatched returns no rows.
/// Executed SQL is recorded so tests can assert on issued queries.
pub struct StaticConnector {
    database_type: DatabaseType,
    responses: Vec<(Vec<String>, Vec<Row>)>,
    failures: Vec<Vec<String>>,
    healthy: bool,
    executed: Mutex<Vec<String>>,
}

impl StaticConnector {
    pub fn new(database_type: DatabaseType) -> Self {
        Self {
            database_type,
            responses: Vec::new(),
            failures: Vec::new(),
            healthy: true,
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Register canned rows for queries matching `needle`.
    pub fn with_response(mut self, needle: impl Into<String>, rows: Vec<Row>) -> Self {
        self.responses.push((vec![needle.into()], rows));
        self
    }

    /// Register canned rows for queries matching every needle, e.g. a query
    /// kind plus the table name it is bound to.
    pub fn with_scoped_response(mut self, needles: &[&str], rows: Vec<Row>) -> Self {
        self.responses
            .push((needles.iter().map(|n| n.to_string()).collect(), rows));
        self
    }

    /// Make queries matching `needle` fail with a connector error.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.failures.push(vec![needle.into()]);
        self
    }

    /// Make queries matching every needle fail with a connector error.
    pub fn failing_on_scoped(mut self, needles: &[&str]) -> Self {
        self.failures
            .push(needles.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// SQL statements executed so far, in order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed.lock().expect("executed queries lock").clone()
    }

    fn matches(needles: &[String], sql: &str, params: &[Value]) -> bool {
        needles.iter().all(|needle| {
            sql.contains(needle.as_str())
                || params
                    .iter()
                    .any(|p| matches!(p, Value::String(s) if s == needle))
        })
    }
}

#[async_trait]
impl Connector for StaticConnector {
    fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.executed
            .lock()
            .expect("executed queries lock")
            .push(sql.to_string());

        if let Some(needles) = self
            .failures
            .iter()
            .find(|needles| Self::matches(needles, sql, params))
        {
            return Err(Error::Connector(format!(
                "scripted failure for query matching {:?}",
                needles
            )));
        }

        for (needles, rows) in &self.responses {
            if Self::matches(needles, sql, params) {
                return Ok(rows.clone());
            }
        }
        Ok(Vec::new())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}

// ============================================
// Embedded SQLite connector
// ============================================

/// A connector backed by an embedded SQLite database.
///
/// SQLite is not one of the profiled dialects, so this connector reports
/// [`DatabaseType::Unknown`] and the profiler falls back to PostgreSQL query
/// syntax. Catalog queries against `information_schema` fail and degrade to
/// empty metadata per the extractor's error policy; row counts and sample
/// data work, which is enough for smoke runs and integration tests.
pub struct SqliteConnector {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteConnector {
    /// Open (or create) a SQLite database at `path`.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run one or more statements without reading results. Intended for
    /// fixture setup.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite connection lock");
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn run_query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let conn = self.conn.lock().expect("sqlite connection lock");
        let mut stmt = conn.prepare(sql)?;
        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|n| n.to_lowercase())
            .collect();

        let bound: Vec<rusqlite::types::Value> = params.iter().map(json_to_sql).collect();
        let mut rows = stmt.query(rusqlite::params_from_iter(bound))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (idx, name) in column_names.iter().enumerate() {
                record.insert(name.clone(), sql_to_json(row.get_ref(idx)?));
            }
            out.push(record);
        }
        Ok(out)
    }
}

fn json_to_sql(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                rusqlite::types::Value::Integer(i)
            } else {
                rusqlite::types::Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        other => rusqlite::types::Value::Text(other.to_string()),
    }
}

fn sql_to_json(value: rusqlite::types::ValueRef<'_>) -> Value {
    match value {
        rusqlite::types::ValueRef::Null => Value::Null,
        rusqlite::types::ValueRef::Integer(i) => Value::from(i),
        rusqlite::types::ValueRef::Real(f) => Value::from(f),
        rusqlite::types::ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        rusqlite::types::ValueRef::Blob(b) => Value::from(hex::encode(b)),
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Unknown
    }

    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.run_query(sql, params)
    }

    async fn health_check(&self) -> bool {
        self.run_query("SELECT 1", &[]).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_static_connector_matching() {
        let connector = StaticConnector::new(DatabaseType::Mysql)
            .with_response("COUNT(*)", vec![row(&[("row_count", json!(42))])])
            .failing_on("INFORMATION_SCHEMA.STATISTICS");

        let rows = connector
            .execute_query("SELECT COUNT(*) as row_count FROM `t`", &[])
            .await
            .unwrap();
        assert_eq!(rows[0]["row_count"], json!(42));

        let err = connector
            .execute_query("SELECT * FROM INFORMATION_SCHEMA.STATISTICS", &[])
            .await;
        assert!(err.is_err());

        let unmatched = connector.execute_query("SELECT 1", &[]).await.unwrap();
        assert!(unmatched.is_empty());

        assert_eq!(connector.executed_queries().len(), 3);
        assert!(connector.health_check().await);
    }

    #[tokio::test]
    async fn test_static_connector_scoped_matching() {
        let connector = StaticConnector::new(DatabaseType::Mysql)
            .with_scoped_response(
                &["INFORMATION_SCHEMA.COLUMNS", "patients"],
                vec![row(&[("column_name", json!("id"))])],
            )
            .with_scoped_response(
                &["INFORMATION_SCHEMA.COLUMNS", "providers"],
                vec![row(&[("column_name", json!("npi"))])],
            );

        // The table name arrives as a binding, not in the SQL text
        let sql = "SELECT ... FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = %s";
        let rows = connector
            .execute_query(sql, &[json!("clinic"), json!("providers")])
            .await
            .unwrap();
        assert_eq!(rows[0]["column_name"], json!("npi"));

        let rows = connector
            .execute_query(sql, &[json!("clinic"), json!("patients")])
            .await
            .unwrap();
        assert_eq!(rows[0]["column_name"], json!("id"));

        let rows = connector
            .execute_query(sql, &[json!("clinic"), json!("unknown")])
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_connector_query() {
        let connector = SqliteConnector::open_in_memory().unwrap();
        connector
            .execute_batch(
                "CREATE TABLE patients (id INTEGER PRIMARY KEY, email TEXT);
                 INSERT INTO patients (id, email) VALUES (1, 'a@clinic.org'), (2, NULL);",
            )
            .unwrap();

        let rows = connector
            .execute_query("SELECT COUNT(*) AS row_count FROM \"patients\"", &[])
            .await
            .unwrap();
        assert_eq!(rows[0]["row_count"], json!(2));

        let rows = connector
            .execute_query("SELECT * FROM \"patients\" WHERE id = ?", &[json!(1)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["email"], json!("a@clinic.org"));

        // Column names are lowercased
        let rows = connector
            .execute_query("SELECT id AS Id FROM \"patients\" LIMIT 1", &[])
            .await
            .unwrap();
        assert!(rows[0].contains_key("id"));

        assert!(connector.health_check().await);
        assert_eq!(connector.database_type(), DatabaseType::Unknown);
    }

    #[tokio::test]
    async fn test_sqlite_connector_error_on_missing_table() {
        let connector = SqliteConnector::open_in_memory().unwrap();
        let err = connector
            .execute_query("SELECT * FROM information_schema.columns", &[])
            .await;
        assert!(err.is_err());
    }
}
