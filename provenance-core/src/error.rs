use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::upload::ProviderFailure;

/// Failure reported by a single upload provider for a single attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// 5xx, timeout, connection failure or rate limiting. Retried with backoff.
    #[error("transient failure from {provider}: {message}")]
    Transient { provider: String, message: String },

    /// Non-rate-limited 4xx or an unusable response. Never retried.
    #[error("permanent failure from {provider}: {message}")]
    Permanent { provider: String, message: String },
}

impl ProviderError {
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("no upload providers configured")]
    NoProviders,

    #[error("all upload providers exhausted: {}", summarize_failures(.failures))]
    AllProvidersExhausted { failures: Vec<ProviderFailure> },

    #[error("upload interrupted: {0}")]
    Cancelled(#[from] CancelError),
}

fn summarize_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} after {} attempt(s): {}", f.provider, f.attempts, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A manifest failed validation. Always names the offending field.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("invalid manifest field `{field}`: {reason}")]
pub struct ManifestValidationError {
    pub field: String,
    pub reason: String,
}

impl ManifestValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while fetching a manifest from a URI.
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error(transparent)]
    Validation(#[from] ManifestValidationError),

    #[error("failed to fetch {uri}: {message}")]
    Fetch { uri: String, message: String },

    #[error("fetching {uri} returned status {status}")]
    Status { uri: String, status: u16 },

    #[error("manifest fetch interrupted: {0}")]
    Cancelled(#[from] CancelError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Node unreachable, timed out or temporarily overloaded. Retried.
    #[error("transient registry RPC failure: {0}")]
    RpcTransient(String),

    /// JSON-RPC error the node will keep returning.
    #[error("registry RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The contract rejected the call. Never retried.
    #[error("registry contract reverted: {reason}")]
    Reverted { reason: String },

    #[error("transaction {tx_hash} not confirmed in time")]
    ConfirmationTimeout { tx_hash: String },

    #[error("invalid registry response: {0}")]
    InvalidResponse(String),

    #[error("registry call interrupted: {0}")]
    Cancelled(#[from] CancelError),
}

impl RegistryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RpcTransient(_))
    }
}

/// The platform URL does not match any registered platform shape.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("unrecognized platform URL `{url}`: {reason}")]
pub struct ParseError {
    pub url: String,
    pub reason: String,
}

/// Reason a platform binding failed verification.
///
/// Stored verbatim inside failed `VerificationRecord`s.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationError {
    #[error(transparent)]
    Parse(ParseError),

    #[error("manifest {uri} unavailable: {message}")]
    ManifestUnavailable { uri: String, message: String },

    #[error("manifest {uri} rejected: {error}")]
    ManifestInvalid {
        uri: String,
        error: ManifestValidationError,
    },

    #[error("platform proof unavailable: {message}")]
    ProofUnavailable { message: String },

    #[error("no proof found in platform content")]
    ProofMissing,

    #[error("malformed proof: {reason}")]
    MalformedProof { reason: String },

    #[error("proof covers {proof_hash} but manifest hash is {manifest_hash}")]
    HashMismatch {
        manifest_hash: String,
        proof_hash: String,
    },

    #[error("signature verification failed: expected signer {expected}, recovered {recovered}")]
    SignatureVerification { expected: String, recovered: String },

    #[error("identity `{identity}` has no derivable controller key")]
    UnsupportedIdentity { identity: String },

    #[error("proof timestamp {timestamp} out of range at {checked_at}: {reason}")]
    TimestampOutOfRange {
        timestamp: i64,
        checked_at: i64,
        reason: String,
    },

    #[error("verification interrupted: {reason}")]
    Cancelled { reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(String),

    #[error("invalid configuration value {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store conflict: {0}")]
    Conflict(String),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Umbrella error for operations spanning several pipeline stages.
#[derive(Error, Debug)]
pub enum ProvenanceError {
    #[error("upload stage: {0}")]
    Upload(#[from] UploadError),

    #[error("manifest stage: {0}")]
    Manifest(#[from] ManifestValidationError),

    #[error("manifest stage: {0}")]
    Resolve(#[from] ResolveError),

    #[error("registry stage: {0}")]
    Registry(#[from] RegistryError),

    #[error("binding: {0}")]
    Parse(#[from] ParseError),

    #[error("verification: {0}")]
    Verification(#[from] VerificationError),

    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("content store: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("no binding submitted for {platform} content {external_id}")]
    BindingNotFound { platform: String, external_id: String },

    #[error("illegal state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: crate::pipeline::ContentState,
        to: crate::pipeline::ContentState,
    },

    #[error(transparent)]
    Cancelled(#[from] CancelError),
}

pub type Result<T> = std::result::Result<T, ProvenanceError>;
