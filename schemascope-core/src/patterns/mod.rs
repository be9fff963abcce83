//! Field pattern recognition
//!
//! Tags columns with domain semantics (`email_address`, `npi_identifier`,
//! `status_field`, ...) from their name and sampled values. Rules are loaded
//! once from a JSON config into precompiled form; detection operates on an
//! immutable snapshot so a concurrent reload can never alter a detection
//! mid-flight.
//!
//! Detection is deterministic: the same values, field name, and loaded
//! config always produce the same output.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Default rule set bundled with the library.
const DEFAULT_PATTERNS_JSON: &str = include_str!("../../config/field_patterns.json");

/// One pattern rule as it appears in the config file. All fields are
/// optional; a rule with neither `regex` nor `valid_values` can only be
/// confirmed through its field name and is never emitted on data evidence
/// alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternRule {
    /// Exact field names (case-insensitive) this pattern applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_names: Option<Vec<String>>,
    /// Wildcard field-name patterns: `*text*`, `*text`, `text*`, or exact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<String>>,
    /// Regex the sampled values must match (anchored at the start)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    /// Closed vocabulary of accepted values (case-insensitive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_values: Option<Vec<String>>,
    /// Data types this pattern is typically seen on (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_types: Option<Vec<String>>,
}

/// A rule with its regex compiled.
#[derive(Debug, Clone)]
struct CompiledRule {
    rule: PatternRule,
    regex: Option<Regex>,
}

/// Immutable snapshot of all loaded rules.
#[derive(Debug, Default)]
struct PatternSet {
    rules: BTreeMap<String, CompiledRule>,
}

/// Recognition thresholds. Defaults follow the profiler's standard tuning.
#[derive(Debug, Clone)]
pub struct RecognizerSettings {
    /// Fraction of sampled values that must match when the field name agrees
    pub min_match_ratio: f64,
    /// Fraction required for a data-only match (no field-name agreement)
    pub strict_match_ratio: f64,
    /// At most this many sample values are tested per pattern
    pub max_sample_size: usize,
    /// Minimum number of non-empty string values required to attempt detection
    pub min_sample_size: usize,
}

impl Default for RecognizerSettings {
    fn default() -> Self {
        Self {
            min_match_ratio: 0.8,
            strict_match_ratio: 0.95,
            max_sample_size: 10,
            min_sample_size: 3,
        }
    }
}

/// Fixed specificity ranking used for conflict resolution; higher wins.
fn specificity(pattern: &str) -> i32 {
    match pattern {
        "npi_identifier" => 10,
        "email_address" => 9,
        "patient_id" | "provider_id" => 8,
        "phone_number" => 7,
        "status_field" => 6,
        "person_name" | "date_of_birth" => 5,
        "basic_id_fallback" => 1,
        _ => 0,
    }
}

/// Recognizes domain patterns in column data using configurable rules.
///
/// The rule set lives behind a read/write lock holding an `Arc` snapshot;
/// [`PatternRecognizer::reload`] builds the replacement off to the side and
/// swaps the reference atomically.
pub struct PatternRecognizer {
    config_path: Option<PathBuf>,
    settings: RecognizerSettings,
    set: RwLock<Arc<PatternSet>>,
}

impl PatternRecognizer {
    /// Create a recognizer from a config file, or from the bundled default
    /// rules when no path is given.
    ///
    /// A missing or malformed config degrades to an empty rule set (logged
    /// at `error` once); detection then returns no patterns.
    pub fn new(config_path: Option<&Path>) -> Self {
        let set = match Self::load_set(config_path) {
            Ok(set) => set,
            Err(e) => {
                tracing::error!(
                    path = ?config_path,
                    error = %e,
                    "Failed to load pattern config, pattern detection disabled"
                );
                PatternSet::default()
            }
        };
        tracing::info!(patterns = set.rules.len(), "Loaded field patterns");
        Self {
            config_path: config_path.map(Path::to_path_buf),
            settings: RecognizerSettings::default(),
            set: RwLock::new(Arc::new(set)),
        }
    }

    /// Create a recognizer directly from a JSON rule document.
    pub fn from_json(content: &str) -> Result<Self> {
        let set = Self::parse_set(content)?;
        Ok(Self {
            config_path: None,
            settings: RecognizerSettings::default(),
            set: RwLock::new(Arc::new(set)),
        })
    }

    /// Override the detection thresholds.
    pub fn with_settings(mut self, settings: RecognizerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Re-read the config file and atomically swap in the new rule set.
    /// In-flight detections keep using the snapshot they captured at entry.
    pub fn reload(&self) -> Result<()> {
        let set = Self::load_set(self.config_path.as_deref())?;
        let count = set.rules.len();
        *self.set.write().expect("pattern set lock") = Arc::new(set);
        tracing::info!(patterns = count, "Reloaded field patterns");
        Ok(())
    }

    /// Names of all loaded patterns.
    pub fn available_patterns(&self) -> Vec<String> {
        self.snapshot().rules.keys().cloned().collect()
    }

    /// The rule definition behind a pattern name.
    pub fn pattern_info(&self, pattern_name: &str) -> Option<PatternRule> {
        self.snapshot()
            .rules
            .get(pattern_name)
            .map(|c| c.rule.clone())
    }

    /// Detect patterns in a column's sampled values.
    ///
    /// Returns pattern names most specific first, already conflict-resolved.
    /// Input with fewer than `min_sample_size` usable values is rejected.
    pub fn detect_patterns(&self, values: &[Value], field_name: Option<&str>) -> Vec<String> {
        let string_values = stringify_values(values);
        if string_values.len() < self.settings.min_sample_size {
            return Vec::new();
        }

        let set = self.snapshot();
        let mut detected = Vec::new();
        for (name, compiled) in &set.rules {
            if self.test_pattern(compiled, &string_values, field_name) {
                detected.push(name.clone());
            }
        }

        resolve_conflicts(detected)
    }

    /// Validate a single value against a named pattern.
    pub fn validate_value(&self, value: &Value, pattern_name: &str) -> bool {
        let set = self.snapshot();
        let Some(compiled) = set.rules.get(pattern_name) else {
            return false;
        };
        let Some(s) = stringify(value) else {
            return false;
        };

        if let Some(regex) = &compiled.regex {
            return match_at_start(regex, &s);
        }
        if let Some(valid) = &compiled.rule.valid_values {
            return valid.iter().any(|v| v.eq_ignore_ascii_case(&s));
        }
        false
    }

    fn snapshot(&self) -> Arc<PatternSet> {
        self.set.read().expect("pattern set lock").clone()
    }

    fn test_pattern(
        &self,
        compiled: &CompiledRule,
        values: &[String],
        field_name: Option<&str>,
    ) -> bool {
        let field_name_match = field_name
            .map(|name| matches_field_name(name, &compiled.rule))
            .unwrap_or(false);

        if field_name_match {
            return self.data_match(compiled, values, self.settings.min_match_ratio);
        }
        // Without field-name agreement only regex-backed rules may fire,
        // and only on near-unanimous data evidence.
        compiled.regex.is_some()
            && self.data_match(compiled, values, self.settings.strict_match_ratio)
    }

    fn data_match(&self, compiled: &CompiledRule, values: &[String], threshold: f64) -> bool {
        let sample_size = values.len().min(self.settings.max_sample_size);
        if sample_size == 0 {
            return false;
        }

        let matches = if let Some(regex) = &compiled.regex {
            values[..sample_size]
                .iter()
                .filter(|v| match_at_start(regex, v))
                .count()
        } else if let Some(valid) = &compiled.rule.valid_values {
            values[..sample_size]
                .iter()
                .filter(|v| valid.iter().any(|candidate| candidate.eq_ignore_ascii_case(v)))
                .count()
        } else {
            // No data validation available for this rule
            return false;
        };

        matches as f64 / sample_size as f64 >= threshold
    }

    fn load_set(config_path: Option<&Path>) -> Result<PatternSet> {
        match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::PatternConfig(format!("failed to read {:?}: {}", path, e))
                })?;
                Self::parse_set(&content)
            }
            None => Self::parse_set(DEFAULT_PATTERNS_JSON),
        }
    }

    fn parse_set(content: &str) -> Result<PatternSet> {
        let document: Value = serde_json::from_str(content)
            .map_err(|e| Error::PatternConfig(format!("invalid JSON: {}", e)))?;

        // Canonical shape is a flat pattern-name -> rule map. The legacy
        // nested shape wraps the same map under healthcare_patterns.patterns.
        let map = match document.get("healthcare_patterns").and_then(|h| h.get("patterns")) {
            Some(nested) => nested.clone(),
            None => document,
        };

        let raw: BTreeMap<String, PatternRule> = serde_json::from_value(map)
            .map_err(|e| Error::PatternConfig(format!("invalid rule shape: {}", e)))?;

        let mut rules = BTreeMap::new();
        for (name, rule) in raw {
            let regex = match &rule.regex {
                Some(pattern) => match Regex::new(pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(pattern = %name, error = %e, "Invalid regex, rule kept without data validation");
                        None
                    }
                },
                None => None,
            };
            rules.insert(name, CompiledRule { rule, regex });
        }
        Ok(PatternSet { rules })
    }
}

/// Anchored-at-start regex match (a full match is not required).
fn match_at_start(regex: &Regex, value: &str) -> bool {
    regex.find(value).map(|m| m.start() == 0).unwrap_or(false)
}

fn matches_field_name(field_name: &str, rule: &PatternRule) -> bool {
    let field_lower = field_name.to_lowercase();

    if let Some(names) = &rule.field_names {
        if names.iter().any(|n| n.eq_ignore_ascii_case(&field_lower)) {
            return true;
        }
    }
    if let Some(patterns) = &rule.patterns {
        if patterns
            .iter()
            .any(|p| matches_wildcard(&field_lower, &p.to_lowercase()))
        {
            return true;
        }
    }
    false
}

/// Simple wildcard matching: `*text*` contains, `*text` ends-with,
/// `text*` starts-with, otherwise exact.
fn matches_wildcard(field_name: &str, pattern: &str) -> bool {
    if pattern.len() >= 2 && pattern.starts_with('*') && pattern.ends_with('*') {
        field_name.contains(&pattern[1..pattern.len() - 1])
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        field_name.ends_with(suffix)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        field_name.starts_with(prefix)
    } else {
        field_name == pattern
    }
}

/// Keep only the most specific detections.
///
/// The top pattern always survives; `npi_identifier` and `email_address`
/// suppress everything else, otherwise the runner-up is kept when its
/// specificity is within 2 of the top.
fn resolve_conflicts(mut detected: Vec<String>) -> Vec<String> {
    if detected.len() <= 1 {
        return detected;
    }

    detected.sort_by_key(|name| std::cmp::Reverse(specificity(name)));

    if detected[0] == "npi_identifier" || detected[0] == "email_address" {
        detected.truncate(1);
        return detected;
    }

    let keep_second = specificity(&detected[1]) >= specificity(&detected[0]) - 2;
    detected.truncate(if keep_second { 2 } else { 1 });
    detected
}

fn stringify(value: &Value) -> Option<String> {
    let s = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn stringify_values(values: &[Value]) -> Vec<String> {
    values.iter().filter_map(stringify).collect()
}
