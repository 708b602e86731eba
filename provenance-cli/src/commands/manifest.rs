//! Manifest command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use provenance_core::{Cid, ContentHash, Identity, ManifestBuilder};
use serde_json::json;
use tracing::info;

use crate::utils::{build_manifest_path, emit, load_owner_key, read_file, write_file};
use crate::Output;

/// Execute the manifest command.
pub fn execute(
    file: PathBuf,
    cid: String,
    identity: String,
    key_file: Option<PathBuf>,
    output_path: Option<PathBuf>,
    output: Output,
) -> Result<()> {
    let content = read_file(&file)?;
    let cid = Cid::parse(&cid).context("Invalid --cid")?;
    let identity = Identity::parse(&identity).context("Invalid --identity")?;

    let mut manifest = ManifestBuilder::new(cid, ContentHash::of(&content), identity).build();
    if let Some(path) = &key_file {
        let key = load_owner_key(path)?;
        manifest = manifest.sign(&key).context("Failed to sign manifest")?;
        info!(signer = %key.address(), "Manifest signed");
    }

    let path = output_path.unwrap_or_else(|| build_manifest_path(&file));
    let document = manifest.to_json_pretty().context("Failed to serialize manifest")?;
    write_file(&path, document.as_bytes())?;
    info!(path = %path.display(), "Manifest saved");

    let manifest_hash = manifest.manifest_hash();
    let value = json!({
        "path": path.display().to_string(),
        "manifest_hash": manifest_hash,
        "manifest": manifest,
    });
    emit(output, &value, || {
        println!();
        println!("{}", "Manifest created".green().bold());
        println!();
        println!("   {} {}", "Saved:".dimmed(), path.display());
        println!("   {} {}", "Content hash:".dimmed(), manifest.content_hash);
        println!("   {} {}", "Manifest hash:".dimmed(), manifest_hash);
        match &manifest.signature {
            Some(signature) => println!("   {} {}", "Signed by:".dimmed(), signature.signer),
            None => println!("   {} {}", "Signed by:".dimmed(), "unsigned".yellow()),
        }
    })
}
