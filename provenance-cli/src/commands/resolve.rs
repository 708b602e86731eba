//! Resolve command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use provenance_core::{CancelToken, ManifestResolver, PipelineConfig};
use serde_json::json;

use crate::utils::emit;
use crate::Output;

/// Execute the resolve command.
pub async fn execute(uri: String, output: Output) -> Result<()> {
    let config = PipelineConfig::from_env().context("Failed to load configuration")?;
    let resolver = ManifestResolver::new(config.resolver.clone()).context("Failed to create resolver")?;

    let cancel = CancelToken::with_deadline(config.verify_deadline);
    let manifest = resolver
        .resolve(&uri, &cancel)
        .await
        .with_context(|| format!("Failed to resolve manifest {uri}"))?;

    let manifest_hash = manifest.manifest_hash();
    let value = json!({
        "uri": uri,
        "manifest_hash": manifest_hash,
        "manifest": manifest,
    });
    emit(output, &value, || {
        println!();
        println!("{}", "Manifest valid".green().bold());
        println!();
        println!("   {} {}", "URI:".dimmed(), uri);
        println!("   {} {}", "Content hash:".dimmed(), manifest.content_hash);
        println!("   {} {}", "CID:".dimmed(), manifest.cid);
        println!("   {} {}", "Identity:".dimmed(), manifest.identity);
        println!("   {} {}", "Created:".dimmed(), manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("   {} {}", "Manifest hash:".dimmed(), manifest_hash);
        if let Some(signature) = &manifest.signature {
            println!("   {} {}", "Signed by:".dimmed(), signature.signer);
        }
    })
}
