//! Provenance Core - content identity pipeline
//!
//! Registers a piece of content's provenance and verifies that a platform
//! account published it:
//!
//! - Resilient upload to a prioritized pool of content-addressed stores
//! - Canonical manifests binding content hash, CID and identity
//! - Idempotent anchoring of manifest hashes in an on-chain registry
//! - Verification of signed proofs embedded in YouTube and Vimeo descriptions
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use provenance_core::{
//!     BackoffPolicy, CancelToken, Identity, MemoryContentStore, MemoryLedger, MockUploadProvider,
//!     Pipeline, PlatformRegistry, PlatformVerifier, RegistryClient, RegistryClientConfig,
//!     ManifestResolver, ResolverConfig, StaticProofSource, UploadOrchestrator, VerifierConfig,
//! };
//!
//! # async fn example() -> provenance_core::Result<()> {
//! let uploader = UploadOrchestrator::new(BackoffPolicy::default())
//!     .with_provider(0, Arc::new(MockUploadProvider::default()));
//! let registry = RegistryClient::new(
//!     Arc::new(MemoryLedger::new("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266")),
//!     RegistryClientConfig::default(),
//! );
//! let verifier = PlatformVerifier::new(
//!     PlatformRegistry::with_defaults(),
//!     Arc::new(ManifestResolver::new(ResolverConfig::default())?),
//!     Arc::new(StaticProofSource::new()),
//!     VerifierConfig::default(),
//! );
//! let pipeline = Pipeline::new(uploader, registry, verifier, Arc::new(MemoryContentStore::new()));
//!
//! let identity = Identity::parse("did:ethr:0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266")?;
//! let registration = pipeline
//!     .register(b"Hello World", &identity, None, &CancelToken::new())
//!     .await?;
//! println!("manifest at {}", registration.manifest_uri);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod cid;
pub mod config;
pub mod error;
pub mod hash;
pub mod identity;
pub mod manifest;
pub mod mask;
pub mod pipeline;
pub mod platform;
pub mod registry;
pub mod retry;
pub mod signature;
pub mod store;
pub mod upload;

// Re-export main types for convenience
pub use cancel::{CancelToken, Interrupted};
pub use cid::Cid;
pub use config::PipelineConfig;
pub use error::{
    CancelError, ConfigError, CryptoError, ManifestValidationError, ParseError, ProvenanceError,
    ProviderError, RegistryError, ResolveError, Result, StoreError, UploadError, VerificationError,
};
pub use hash::ContentHash;
pub use identity::Identity;
pub use manifest::{
    parse_manifest, Manifest, ManifestBuilder, ManifestCache, ManifestResolver, ManifestSource,
    ResolverConfig, MANIFEST_VERSION,
};
pub use pipeline::{ContentState, Pipeline, Registration};
pub use platform::{
    ExternalContentRef, HttpProofSource, PlatformBinding, PlatformProof, PlatformRegistry,
    PlatformVerifier, ProofSource, StaticProofSource, VerificationOutcome, VerificationRecord,
    VerifierConfig,
};
pub use registry::{
    AnchorOutcome, EvmRegistryConfig, EvmRegistryContract, MemoryLedger, RegistryClient,
    RegistryClientConfig, RegistryContract, RegistryEntry, TxHash,
};
pub use retry::BackoffPolicy;
pub use signature::{recover_signer, Address, OwnerKey};
pub use store::{ContentStore, MemoryContentStore};
pub use upload::{
    AuthScheme, HttpUploadProvider, MockUploadProvider, ProviderConfig, UploadConfig,
    UploadOrchestrator, UploadProvider, UploadResult,
};
