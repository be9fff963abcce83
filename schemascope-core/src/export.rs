//! Profile export adaptor
//!
//! Serializes a [`SchemaProfile`] for downstream consumers. JSON is the
//! canonical wire format; YAML is offered for human review. XML is accepted
//! by the configuration for compatibility but not produced by this build.

use crate::config::ExportFormat;
use crate::error::{Error, Result};
use crate::types::SchemaProfile;
use std::path::Path;

/// Canonical pretty-printed JSON serialization of a profile.
pub fn to_json(profile: &SchemaProfile) -> Result<String> {
    Ok(serde_json::to_string_pretty(profile)?)
}

/// YAML serialization of a profile.
pub fn to_yaml(profile: &SchemaProfile) -> Result<String> {
    serde_yaml::to_string(profile).map_err(|e| Error::Export(format!("YAML serialization: {}", e)))
}

/// Serialize a profile in the requested format.
pub fn render(profile: &SchemaProfile, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => to_json(profile),
        ExportFormat::Yaml => to_yaml(profile),
        ExportFormat::Xml => Err(Error::Export(
            "XML export is not supported by this build".to_string(),
        )),
    }
}

/// Write a profile to `path` in the requested format, creating parent
/// directories as needed.
pub fn write_profile(profile: &SchemaProfile, path: &Path, format: ExportFormat) -> Result<()> {
    let content = render(profile, format)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), format = ?format, "Schema profile exported");
    Ok(())
}
