//! Anchor command implementation.
//!
//! Records a manifest's hash in the provenance registry, at most once.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use provenance_core::{
    AnchorOutcome, CancelToken, ConfigError, EvmRegistryContract, MemoryLedger, PipelineConfig,
    RegistryClient, RegistryClientConfig, RegistryContract,
};
use serde_json::json;
use tracing::{info, warn};

use crate::utils::{emit, load_manifest};
use crate::Output;

const MOCK_ACCOUNT: &str = "0x0000000000000000000000000000000000000000";

/// Execute the anchor command.
pub async fn execute(manifest_path: PathBuf, use_mock: bool, output: Output) -> Result<()> {
    let config = PipelineConfig::from_env().context("Failed to load configuration")?;
    let manifest = load_manifest(&manifest_path, &config)?;

    let contract: Arc<dyn RegistryContract> = if use_mock {
        warn!("Using MOCK registry (nothing is recorded on a ledger)");
        if !output.quiet {
            eprintln!("{}", "Using MOCK registry".yellow());
        }
        Arc::new(MemoryLedger::new(MOCK_ACCOUNT))
    } else {
        let registry = config
            .registry
            .clone()
            .ok_or_else(|| ConfigError::Missing("REGISTRY_RPC_URL".to_string()))?;
        Arc::new(EvmRegistryContract::new(registry).context("Failed to create registry client")?)
    };
    let client = RegistryClient::new(contract, RegistryClientConfig::default());

    let manifest_hash = manifest.manifest_hash();
    info!(hash = %manifest_hash, identity = %manifest.identity, "Anchoring manifest");
    let cancel = CancelToken::with_deadline(client.config().confirmation_timeout);
    let outcome = client
        .anchor(&manifest_hash, &manifest.identity, &cancel)
        .await
        .context("Failed to anchor manifest")?;

    let fresh = matches!(outcome, AnchorOutcome::Anchored(_));
    let entry = outcome.into_entry();
    let value = json!({
        "anchored": fresh,
        "entry": entry,
    });
    emit(output, &value, || {
        println!();
        if fresh {
            println!("{}", "Manifest anchored".green().bold());
        } else {
            println!("{}", "Manifest already anchored".cyan().bold());
        }
        println!();
        println!("   {} {}", "Manifest hash:".dimmed(), entry.content_hash);
        println!("   {} {}", "Identity:".dimmed(), entry.identity);
        if let Some(tx) = &entry.tx_hash {
            println!("   {} {}", "Transaction:".dimmed(), tx);
        }
        println!("   {} {}", "Anchored at:".dimmed(), entry.anchored_at.format("%Y-%m-%d %H:%M:%S UTC"));
    })
}
