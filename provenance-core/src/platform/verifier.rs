//! Verification of platform bindings.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::proof::{PlatformProof, ProofSource};
use super::{PlatformBinding, PlatformRegistry, VerificationOutcome, VerificationRecord};
use crate::cancel::{CancelToken, Interrupted};
use crate::error::{CancelError, ResolveError, VerificationError};
use crate::manifest::{Manifest, ManifestSource};
use crate::mask::mask;
use crate::signature::Address;

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Oldest acceptable proof.
    pub max_age: Duration,
    /// How far in the future a proof timestamp may lie.
    pub clock_skew: Duration,
    /// Bound on each network call.
    pub call_timeout: Duration,
    pub max_concurrency: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(365 * 24 * 60 * 60),
            clock_skew: Duration::from_secs(5 * 60),
            call_timeout: Duration::from_secs(15),
            max_concurrency: 8,
        }
    }
}

pub struct PlatformVerifier {
    platforms: PlatformRegistry,
    manifests: Arc<dyn ManifestSource>,
    proofs: Arc<dyn ProofSource>,
    config: VerifierConfig,
}

/// A failed check, with the signer if it was recovered before failing.
type Rejection = (VerificationError, Option<Address>);

fn cancelled(reason: CancelError) -> VerificationError {
    VerificationError::Cancelled {
        reason: reason.to_string(),
    }
}

impl PlatformVerifier {
    pub fn new(
        platforms: PlatformRegistry,
        manifests: Arc<dyn ManifestSource>,
        proofs: Arc<dyn ProofSource>,
        config: VerifierConfig,
    ) -> Self {
        Self {
            platforms,
            manifests,
            proofs,
            config,
        }
    }

    pub fn platforms(&self) -> &PlatformRegistry {
        &self.platforms
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify one binding. Every call yields a record, verified or failed.
    #[instrument(skip(self, binding, cancel), fields(binding_id = %binding.id, proof_url = %binding.proof_url))]
    pub async fn verify(&self, binding: &PlatformBinding, cancel: &CancelToken) -> VerificationRecord {
        let checked_at = Utc::now();
        let (outcome, recovered_signer) = match self.check(binding, cancel, checked_at).await {
            Ok(signer) => {
                info!(signer = %signer, "Binding verified");
                (VerificationOutcome::Verified, Some(signer))
            }
            Err((reason, signer)) => {
                warn!(reason = %reason, "Binding verification failed");
                (VerificationOutcome::Failed { reason }, signer)
            }
        };

        VerificationRecord {
            id: Uuid::new_v4(),
            binding_id: binding.id,
            platform: binding.platform.clone(),
            external_id: binding.external_id.clone(),
            outcome,
            recovered_signer,
            checked_at,
        }
    }

    /// Verify bindings concurrently, at most `max_concurrency` at a time.
    /// Records come back in input order.
    pub async fn verify_batch(
        &self,
        bindings: &[PlatformBinding],
        cancel: &CancelToken,
    ) -> Vec<VerificationRecord> {
        stream::iter(bindings)
            .map(|binding| self.verify(binding, cancel))
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await
    }

    async fn check(
        &self,
        binding: &PlatformBinding,
        cancel: &CancelToken,
        checked_at: DateTime<Utc>,
    ) -> Result<Address, Rejection> {
        let reject = |error: VerificationError| (error, None);

        cancel.check().map_err(|e| reject(cancelled(e)))?;
        let content = self
            .platforms
            .parse(&binding.proof_url)
            .map_err(|e| reject(VerificationError::Parse(e)))?;

        let manifest = self
            .fetch_manifest(&binding.manifest_uri, cancel)
            .await
            .map_err(reject)?;

        cancel.check().map_err(|e| reject(cancelled(e)))?;
        let text = match cancel
            .run_bounded(self.config.call_timeout, self.proofs.fetch_proof_text(&content, cancel))
            .await
        {
            Ok(result) => result.map_err(reject)?,
            Err(Interrupted::TimedOut(limit)) => {
                return Err(reject(VerificationError::ProofUnavailable {
                    message: format!("timed out after {}ms", limit.as_millis()),
                }))
            }
            Err(Interrupted::Cancelled(reason)) => return Err(reject(cancelled(reason))),
        };

        let proof = PlatformProof::extract(&text).map_err(reject)?;
        if proof.content_hash != manifest.content_hash {
            return Err(reject(VerificationError::HashMismatch {
                manifest_hash: manifest.content_hash.to_hex(),
                proof_hash: proof.content_hash.to_hex(),
            }));
        }

        let recovered = proof.recover_signer().map_err(|e| {
            reject(VerificationError::MalformedProof {
                reason: e.to_string(),
            })
        })?;

        let Some(controller) = manifest.identity.controller_address() else {
            return Err((
                VerificationError::UnsupportedIdentity {
                    identity: manifest.identity.to_string(),
                },
                Some(recovered),
            ));
        };
        if recovered != controller {
            return Err((
                VerificationError::SignatureVerification {
                    expected: controller.to_string(),
                    recovered: recovered.to_string(),
                },
                Some(recovered),
            ));
        }

        self.check_timestamp(proof.timestamp, checked_at)
            .map_err(|e| (e, Some(recovered)))?;
        Ok(recovered)
    }

    async fn fetch_manifest(&self, uri: &str, cancel: &CancelToken) -> Result<Manifest, VerificationError> {
        let unavailable = |message: String| VerificationError::ManifestUnavailable {
            uri: mask(uri).to_string(),
            message,
        };
        match cancel
            .run_bounded(self.config.call_timeout, self.manifests.fetch_manifest(uri, cancel))
            .await
        {
            Ok(Ok(manifest)) => Ok(manifest),
            Ok(Err(ResolveError::Cancelled(reason))) => Err(cancelled(reason)),
            Ok(Err(ResolveError::Validation(error))) => Err(VerificationError::ManifestInvalid {
                uri: mask(uri).to_string(),
                error,
            }),
            Ok(Err(e)) => Err(unavailable(e.to_string())),
            Err(Interrupted::TimedOut(limit)) => {
                Err(unavailable(format!("timed out after {}ms", limit.as_millis())))
            }
            Err(Interrupted::Cancelled(reason)) => Err(cancelled(reason)),
        }
    }

    fn check_timestamp(&self, timestamp: i64, checked_at: DateTime<Utc>) -> Result<(), VerificationError> {
        let now = checked_at.timestamp();
        let out_of_range = |reason: String| VerificationError::TimestampOutOfRange {
            timestamp,
            checked_at: now,
            reason,
        };

        let max_age = i128::from(self.config.max_age.as_secs());
        let skew = i128::from(self.config.clock_skew.as_secs());
        // i128 so any pair of i64 seconds subtracts without overflow.
        let age = i128::from(now) - i128::from(timestamp);

        if -age > skew {
            return Err(out_of_range(format!(
                "{}s in the future exceeds clock skew of {skew}s",
                -age
            )));
        }
        if age > max_age {
            return Err(out_of_range(format!("{age}s old exceeds maximum age of {max_age}s")));
        }
        Ok(())
    }
}
