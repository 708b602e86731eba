//! Hash command implementation.

use std::path::PathBuf;

use anyhow::Result;
use provenance_core::ContentHash;
use serde_json::json;

use crate::utils::read_file;
use crate::{Output, OutputFormat};

/// Execute the hash command. The hash is the result, so it is printed even
/// in quiet mode.
pub fn execute(file: PathBuf, output: Output) -> Result<()> {
    let content = read_file(&file)?;
    let hash = ContentHash::of(&content);

    match output.format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "file": file.display().to_string(), "content_hash": hash })
        ),
        OutputFormat::Text => println!("{hash}"),
    }
    Ok(())
}
