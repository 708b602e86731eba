//! Common utility functions shared across CLI commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use provenance_core::{parse_manifest, Manifest, OwnerKey, PipelineConfig};
use serde_json::Value;
use tracing::debug;

use crate::{Output, OutputFormat};

/// Read an input file, tagging failures as input errors.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    let content =
        std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    debug!(path = %path.display(), bytes = content.len(), "Read file");
    Ok(content)
}

pub fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write file: {}", path.display()))
}

/// Load a hex-encoded owner key from a file.
pub fn load_owner_key(path: &Path) -> Result<OwnerKey> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file: {}", path.display()))?;
    OwnerKey::from_hex(&raw).with_context(|| format!("Invalid owner key in {}", path.display()))
}

/// Load and validate a manifest file with the configured clock skew.
pub fn load_manifest(path: &Path, config: &PipelineConfig) -> Result<Manifest> {
    let body = read_file(path)?;
    let skew = chrono::Duration::from_std(config.resolver.clock_skew)
        .context("Invalid manifest clock skew")?;
    let manifest = parse_manifest(&body, Utc::now(), skew)
        .with_context(|| format!("Invalid manifest: {}", path.display()))?;
    Ok(manifest)
}

/// Default manifest output path: `file.ext` becomes `file.ext.manifest.json`.
pub fn build_manifest_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".manifest.json");
    PathBuf::from(name)
}

/// Print a command result as JSON, or run `text` for the human rendering.
pub fn emit(output: Output, value: &Value, text: impl FnOnce()) -> Result<()> {
    match output.format {
        OutputFormat::Json => {
            let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
            println!("{rendered}");
        }
        OutputFormat::Text if output.quiet => {}
        OutputFormat::Text => text(),
    }
    Ok(())
}
