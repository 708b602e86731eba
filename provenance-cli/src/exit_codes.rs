//! Exit codes following sysexits.h conventions.
//!
//! These codes provide semantic meaning for different failure modes,
//! enabling scripts and CI systems to handle errors appropriately.

use std::fmt;

use provenance_core::{
    ConfigError, CryptoError, ManifestValidationError, ParseError, ProviderError, RegistryError, ResolveError,
    UploadError,
};

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data format error (verification failed, invalid manifest).
/// Maps to EX_DATAERR from sysexits.h.
pub const VERIFICATION_FAILED: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Service unavailable (providers, gateway, registry node).
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const NETWORK_ERROR: i32 = 69;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// A platform binding was checked and rejected.
#[derive(Debug)]
pub struct VerificationFailed(pub String);

impl fmt::Display for VerificationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "verification failed: {}", self.0)
    }
}

impl std::error::Error for VerificationFailed {}

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        let code = err
            .chain()
            .find_map(classify)
            .unwrap_or_else(|| classify_message(&message));

        Self {
            code,
            message: Some(message),
        }
    }
}

/// Exit code for a typed error in the chain, if it has one.
fn classify(cause: &(dyn std::error::Error + 'static)) -> Option<i32> {
    if cause.is::<VerificationFailed>() || cause.is::<ManifestValidationError>() {
        return Some(VERIFICATION_FAILED);
    }
    if cause.is::<ParseError>() || cause.is::<CryptoError>() {
        return Some(USAGE_ERROR);
    }
    if cause.is::<ConfigError>() {
        return Some(GENERAL_ERROR);
    }
    if let Some(e) = cause.downcast_ref::<ResolveError>() {
        return Some(match e {
            ResolveError::Validation(_) => VERIFICATION_FAILED,
            _ => NETWORK_ERROR,
        });
    }
    if let Some(e) = cause.downcast_ref::<RegistryError>() {
        return Some(match e {
            RegistryError::Reverted { .. } => GENERAL_ERROR,
            _ => NETWORK_ERROR,
        });
    }
    if cause.is::<UploadError>() || cause.is::<ProviderError>() {
        return Some(NETWORK_ERROR);
    }
    None
}

fn classify_message(message: &str) -> i32 {
    if message.contains("Failed to read") {
        INPUT_ERROR
    } else if message.contains("Failed to write") {
        IO_ERROR
    } else {
        GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_verification_failure_maps_to_dataerr() {
        let err = anyhow::Error::new(VerificationFailed("signature mismatch".into()));
        assert_eq!(ExitCode::from_anyhow(&err).code, VERIFICATION_FAILED);
    }

    #[test]
    fn test_context_does_not_hide_typed_cause() {
        let err = Err::<(), _>(UploadError::NoProviders)
            .context("Upload failed")
            .unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err).code, NETWORK_ERROR);

        let err = Err::<(), _>(ManifestValidationError::new("version", "unsupported"))
            .context("Failed to parse manifest")
            .unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err).code, VERIFICATION_FAILED);
    }

    #[test]
    fn test_io_messages() {
        let read = anyhow::anyhow!("Failed to read file: missing.bin");
        assert_eq!(ExitCode::from_anyhow(&read).code, INPUT_ERROR);
        let write = anyhow::anyhow!("Failed to write manifest: out.json");
        assert_eq!(ExitCode::from_anyhow(&write).code, IO_ERROR);
        assert_eq!(ExitCode::from_anyhow(&anyhow::anyhow!("boom")).code, GENERAL_ERROR);
    }
}
