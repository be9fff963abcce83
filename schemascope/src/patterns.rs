//! schemascope-patterns - inspect the field pattern rule set
//!
//! Lists the loaded pattern rules, or validates a single value against a
//! named pattern. Useful when tuning a custom patterns config before a
//! profiling run.

use anyhow::Result;
use clap::Parser;
use schemascope_core::patterns::PatternRecognizer;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "schemascope-patterns")]
#[command(about = "Inspect the field pattern rule set")]
#[command(version)]
struct Args {
    /// Path to a patterns config JSON file (bundled rules otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate this value against --pattern and exit
    #[arg(long)]
    validate: Option<String>,

    /// Pattern name to validate against
    #[arg(long)]
    pattern: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let recognizer = PatternRecognizer::new(args.config.as_deref());

    if let (Some(value), Some(pattern)) = (&args.validate, &args.pattern) {
        let valid = recognizer.validate_value(&serde_json::Value::from(value.as_str()), pattern);
        println!(
            "{:?} {} pattern {}",
            value,
            if valid { "matches" } else { "does not match" },
            pattern
        );
        std::process::exit(if valid { 0 } else { 1 });
    }

    let names = recognizer.available_patterns();
    if names.is_empty() {
        println!("No patterns loaded");
        return Ok(());
    }

    println!("{} pattern(s) loaded:", names.len());
    for name in names {
        let Some(rule) = recognizer.pattern_info(&name) else {
            continue;
        };
        let mut facets = Vec::new();
        if let Some(field_names) = &rule.field_names {
            facets.push(format!("{} field name(s)", field_names.len()));
        }
        if let Some(patterns) = &rule.patterns {
            facets.push(format!("{} wildcard(s)", patterns.len()));
        }
        if rule.regex.is_some() {
            facets.push("regex".to_string());
        }
        if let Some(valid_values) = &rule.valid_values {
            facets.push(format!("{} valid value(s)", valid_values.len()));
        }
        println!("  {:<20} {}", name, facets.join(", "));
    }

    Ok(())
}
