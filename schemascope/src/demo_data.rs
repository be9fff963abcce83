//! Embedded demo dataset
//!
//! A small scripted clinic database used by the CLI so the full pipeline
//! can run without a live database. Real deployments embed
//! `schemascope-core` with a driver-backed [`schemascope_core::Connector`].

use schemascope_core::types::{DatabaseType, Row};
use schemascope_core::StaticConnector;
use serde_json::{json, Value};

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn column_row(name: &str, data_type: &str, nullable: &str, position: u32, key: &str) -> Row {
    row(&[
        ("column_name", json!(name)),
        ("data_type", json!(data_type)),
        ("is_nullable", json!(nullable)),
        ("column_key", json!(key)),
        ("ordinal_position", json!(position)),
    ])
}

/// Build the demo connector: a MySQL-flavored clinic with patients and
/// providers, including samples rich enough for pattern detection.
pub fn demo_connector() -> StaticConnector {
    StaticConnector::new(DatabaseType::Mysql)
        .with_response(
            "INFORMATION_SCHEMA.TABLES",
            vec![
                row(&[
                    ("table_name", json!("patient")),
                    ("table_type", json!("BASE TABLE")),
                    ("table_comment", json!("Patient demographics")),
                    ("estimated_rows", json!(128)),
                ]),
                row(&[
                    ("table_name", json!("provider")),
                    ("table_type", json!("BASE TABLE")),
                    ("table_comment", Value::Null),
                    ("estimated_rows", json!(12)),
                ]),
            ],
        )
        .with_scoped_response(
            &["INFORMATION_SCHEMA.COLUMNS", "patient"],
            vec![
                column_row("id", "int", "NO", 1, "PRI"),
                column_row("first_name", "varchar", "YES", 2, ""),
                column_row("email", "varchar", "YES", 3, "UNI"),
                column_row("dob", "date", "YES", 4, ""),
                column_row("provider_id", "int", "YES", 5, ""),
            ],
        )
        .with_scoped_response(
            &["CONSTRAINT_NAME = 'PRIMARY'", "patient"],
            vec![row(&[("column_name", json!("id"))])],
        )
        .with_scoped_response(
            &["SELECT *", "`patient`"],
            vec![
                row(&[
                    ("id", json!(1)),
                    ("first_name", json!("John")),
                    ("email", json!("john@example.com")),
                    ("dob", json!("1980-04-02")),
                    ("provider_id", json!(3)),
                ]),
                row(&[
                    ("id", json!(2)),
                    ("first_name", json!("Jane")),
                    ("email", json!("jane@test.org")),
                    ("dob", json!("1975-11-20")),
                    ("provider_id", json!(3)),
                ]),
                row(&[
                    ("id", json!(3)),
                    ("first_name", json!("Alice")),
                    ("email", json!("alice@hospital.edu")),
                    ("dob", json!("1990-06-15")),
                    ("provider_id", json!(7)),
                ]),
            ],
        )
        .with_scoped_response(
            &["COUNT(*)", "`patient`"],
            vec![row(&[("row_count", json!(128))])],
        )
        .with_scoped_response(
            &["INFORMATION_SCHEMA.COLUMNS", "provider"],
            vec![
                column_row("id", "int", "NO", 1, "PRI"),
                column_row("npi", "varchar", "NO", 2, "UNI"),
                column_row("last_name", "varchar", "YES", 3, ""),
                column_row("status", "varchar", "YES", 4, ""),
            ],
        )
        .with_scoped_response(
            &["CONSTRAINT_NAME = 'PRIMARY'", "provider"],
            vec![row(&[("column_name", json!("id"))])],
        )
        .with_scoped_response(
            &["SELECT *", "`provider`"],
            vec![
                row(&[
                    ("id", json!(3)),
                    ("npi", json!("1234567890")),
                    ("last_name", json!("Okafor")),
                    ("status", json!("active")),
                ]),
                row(&[
                    ("id", json!(7)),
                    ("npi", json!("9876543210")),
                    ("last_name", json!("Srinivasan")),
                    ("status", json!("active")),
                ]),
                row(&[
                    ("id", json!(9)),
                    ("npi", json!("5555666677")),
                    ("last_name", json!("Mercer")),
                    ("status", json!("inactive")),
                ]),
            ],
        )
        .with_scoped_response(
            &["COUNT(*)", "`provider`"],
            vec![row(&[("row_count", json!(12))])],
        )
}
