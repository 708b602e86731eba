//! Sign-proof command implementation.
//!
//! Prints the proof line an owner pastes into a platform description.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use provenance_core::{ContentHash, PlatformProof};
use serde_json::json;

use crate::utils::load_owner_key;
use crate::{Output, OutputFormat};

/// Execute the sign-proof command.
pub fn execute(content_hash: String, key_file: PathBuf, timestamp: Option<i64>, output: Output) -> Result<()> {
    let content_hash = ContentHash::from_hex(&content_hash).context("Invalid content hash")?;
    let key = load_owner_key(&key_file)?;
    let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp());

    let proof = PlatformProof::create(content_hash, timestamp, &key).context("Failed to sign proof")?;
    let line = proof.to_line();

    match output.format {
        OutputFormat::Json => {
            let value = json!({
                "proof": line,
                "signer": key.address(),
                "timestamp": timestamp,
            });
            println!("{}", serde_json::to_string_pretty(&value).context("Failed to serialize output")?);
        }
        OutputFormat::Text => println!("{line}"),
    }
    Ok(())
}
