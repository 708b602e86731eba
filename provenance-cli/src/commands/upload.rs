//! Upload command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use provenance_core::{CancelToken, MockUploadProvider, PipelineConfig, UploadOrchestrator};
use serde_json::json;
use tracing::{info, warn};

use crate::utils::{emit, read_file};
use crate::Output;

/// Execute the upload command.
pub async fn execute(file: PathBuf, use_mock: bool, output: Output) -> Result<()> {
    let content = read_file(&file)?;
    let config = PipelineConfig::from_env().context("Failed to load configuration")?;

    let orchestrator = if use_mock {
        warn!("Using MOCK upload provider (content is not stored anywhere)");
        if !output.quiet {
            eprintln!("{}", "Using MOCK upload provider".yellow());
        }
        UploadOrchestrator::new(config.upload.policy.clone())
            .with_provider(0, Arc::new(MockUploadProvider::default()))
    } else {
        UploadOrchestrator::from_config(&config.upload).context("Failed to set up upload providers")?
    };
    info!(providers = ?orchestrator.provider_names(), "Uploading");

    let result = orchestrator
        .upload(&content, &CancelToken::new())
        .await
        .context("Upload failed")?;

    let failures: Vec<_> = result
        .failures
        .iter()
        .map(|f| json!({ "provider": f.provider, "attempts": f.attempts, "error": f.error.to_string() }))
        .collect();
    let value = json!({
        "cid": result.cid,
        "provider": result.provider,
        "attempts": result.attempts,
        "elapsed_ms": result.elapsed.as_millis() as u64,
        "failures": failures,
    });

    emit(output, &value, || {
        println!();
        println!("{}", "Content uploaded".green().bold());
        println!();
        println!("   {} {}", "CID:".dimmed(), result.cid);
        println!("   {} {}", "URI:".dimmed(), result.cid.to_ipfs_uri());
        println!("   {} {}", "Provider:".dimmed(), result.provider);
        println!("   {} {}", "Attempts:".dimmed(), result.attempts);
        for failure in &result.failures {
            println!(
                "   {} {} after {} attempt(s): {}",
                "Skipped:".dimmed(),
                failure.provider,
                failure.attempts,
                failure.error.to_string().yellow()
            );
        }
    })
}
