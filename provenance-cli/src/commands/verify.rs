//! Verify command implementation.
//!
//! Checks that a platform URL carries a proof signed by the identity named
//! in the referenced manifest.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use provenance_core::{
    CancelToken, ManifestResolver, PipelineConfig, PlatformBinding, PlatformRegistry, PlatformVerifier,
    ProofSource, StaticProofSource,
};
use serde_json::json;
use tracing::info;

use crate::exit_codes::VerificationFailed;
use crate::utils::{emit, read_file};
use crate::Output;

/// Execute the verify command.
pub async fn execute(
    url: String,
    manifest_uri: String,
    proof_file: Option<PathBuf>,
    output: Output,
) -> Result<()> {
    let config = PipelineConfig::from_env().context("Failed to load configuration")?;
    let platforms = PlatformRegistry::with_defaults();
    let content = platforms.parse(&url)?;
    info!(platform = %content.platform, external_id = %content.external_id, "Verifying");

    let proofs: Arc<dyn ProofSource> = match &proof_file {
        Some(path) => {
            let text = String::from_utf8_lossy(&read_file(path)?).into_owned();
            Arc::new(StaticProofSource::new().with_text(
                content.platform.clone(),
                content.external_id.clone(),
                text,
            ))
        }
        None => Arc::new(config.proof_source().context("Failed to set up proof source")?),
    };
    let resolver = ManifestResolver::new(config.resolver.clone())
        .context("Failed to create resolver")?
        .with_cache(config.manifest_cache());

    let verifier = PlatformVerifier::new(platforms, Arc::new(resolver), proofs, config.verifier.clone());
    let binding = PlatformBinding::new(content, &url, &manifest_uri);
    let record = verifier
        .verify(&binding, &CancelToken::with_deadline(config.verify_deadline))
        .await;

    let value = json!({
        "url": url,
        "manifest_uri": manifest_uri,
        "record": record,
    });
    emit(output, &value, || {
        println!();
        if record.is_verified() {
            println!("{}", "Proof verified".green().bold());
        } else {
            println!("{}", "Proof rejected".red().bold());
        }
        println!();
        println!("   {} {}", "Platform:".dimmed(), record.platform);
        println!("   {} {}", "Content ID:".dimmed(), record.external_id);
        println!("   {} {}", "Manifest:".dimmed(), manifest_uri);
        if let Some(signer) = &record.recovered_signer {
            println!("   {} {}", "Signer:".dimmed(), signer);
        }
        if let Some(reason) = record.failure() {
            println!("   {} {}", "Reason:".dimmed(), reason.to_string().red());
        }
    })?;

    match record.failure() {
        Some(reason) => Err(VerificationFailed(reason.to_string()).into()),
        None => Ok(()),
    }
}
