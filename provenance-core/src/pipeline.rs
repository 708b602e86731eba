//! End-to-end registration and binding verification.
//!
//! ```text
//! Uploaded -> ManifestPublished -> RegistryAnchored -> BindingSubmitted -> Verified
//!                                                                       \-> VerificationFailed
//! VerificationFailed -> BindingSubmitted
//! ```
//!
//! Registration stages are tracked per content hash; binding stages per
//! binding instance. `Verified` is terminal for a binding.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::{ProvenanceError, Result};
use crate::hash::ContentHash;
use crate::identity::Identity;
use crate::manifest::{Manifest, ManifestBuilder};
use crate::mask::mask;
use crate::platform::{PlatformBinding, PlatformVerifier, VerificationRecord};
use crate::registry::{AnchorOutcome, RegistryClient};
use crate::signature::OwnerKey;
use crate::store::ContentStore;
use crate::upload::{UploadOrchestrator, UploadResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentState {
    Uploaded,
    ManifestPublished,
    RegistryAnchored,
    BindingSubmitted,
    Verified,
    VerificationFailed,
}

impl ContentState {
    pub fn can_transition_to(self, next: ContentState) -> bool {
        use ContentState::*;
        matches!(
            (self, next),
            (Uploaded, ManifestPublished)
                | (ManifestPublished, RegistryAnchored)
                | (RegistryAnchored, BindingSubmitted)
                | (BindingSubmitted, Verified)
                | (BindingSubmitted, VerificationFailed)
                | (VerificationFailed, BindingSubmitted)
        )
    }

    pub fn transition(self, next: ContentState) -> Result<ContentState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ProvenanceError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ContentState::Verified
    }
}

/// Everything produced by registering one piece of content.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub content_hash: ContentHash,
    pub upload: UploadResult,
    pub manifest: Manifest,
    pub manifest_uri: String,
    pub manifest_upload: UploadResult,
    /// Hash of the canonical manifest, the key anchored in the registry.
    pub anchored_hash: ContentHash,
    pub already_anchored: bool,
    pub state: ContentState,
}

pub struct Pipeline {
    uploader: UploadOrchestrator,
    registry: RegistryClient,
    verifier: PlatformVerifier,
    store: Arc<dyn ContentStore>,
    items: DashMap<ContentHash, ContentState>,
    bindings: DashMap<Uuid, ContentState>,
}

impl Pipeline {
    pub fn new(
        uploader: UploadOrchestrator,
        registry: RegistryClient,
        verifier: PlatformVerifier,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            uploader,
            registry,
            verifier,
            store,
            items: DashMap::new(),
            bindings: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn item_state(&self, hash: &ContentHash) -> Option<ContentState> {
        self.items.get(hash).map(|state| *state)
    }

    pub fn binding_state(&self, binding_id: Uuid) -> Option<ContentState> {
        self.bindings.get(&binding_id).map(|state| *state)
    }

    fn advance_item(&self, hash: ContentHash, next: ContentState) -> Result<ContentState> {
        match self.items.get_mut(&hash) {
            Some(mut state) => {
                *state = state.transition(next)?;
                Ok(*state)
            }
            None => Err(ProvenanceError::InvalidTransition {
                from: ContentState::Uploaded,
                to: next,
            }),
        }
    }

    fn advance_binding(&self, binding_id: Uuid, next: ContentState) -> Result<ContentState> {
        match self.bindings.get_mut(&binding_id) {
            Some(mut state) => {
                *state = state.transition(next)?;
                Ok(*state)
            }
            None => {
                let state = ContentState::RegistryAnchored.transition(next)?;
                self.bindings.insert(binding_id, state);
                Ok(state)
            }
        }
    }

    /// Upload `content`, publish its manifest and anchor the manifest hash.
    ///
    /// Re-registering the same content for the same identity reuses the
    /// manifest published the first time, so it resolves to the same
    /// manifest hash and reports `already_anchored`.
    #[instrument(skip(self, content, owner_key, cancel), fields(size = content.len(), identity = %identity))]
    pub async fn register(
        &self,
        content: &[u8],
        identity: &Identity,
        owner_key: Option<&OwnerKey>,
        cancel: &CancelToken,
    ) -> Result<Registration> {
        cancel.check()?;
        let content_hash = ContentHash::of(content);

        let upload = self.uploader.upload(content, cancel).await?;
        self.items.insert(content_hash, ContentState::Uploaded);
        self.store.put_upload(content_hash, &upload).await?;
        info!(cid = %mask(upload.cid.as_str()), provider = %upload.provider, "Content uploaded");

        let manifest = match self.published_manifest(&upload, content_hash, identity, owner_key).await? {
            Some(previous) => {
                info!("Reusing previously published manifest");
                previous
            }
            None => {
                let manifest = ManifestBuilder::new(upload.cid.clone(), content_hash, identity.clone()).build();
                match owner_key {
                    Some(key) => manifest.sign(key)?,
                    None => manifest,
                }
            }
        };
        let document = manifest.to_json_bytes()?;
        let manifest_upload = self.uploader.upload(&document, cancel).await?;
        let manifest_uri = manifest_upload.cid.to_ipfs_uri();
        self.store.put_manifest(&manifest_uri, &manifest).await?;
        self.advance_item(content_hash, ContentState::ManifestPublished)?;
        info!(manifest_cid = %mask(manifest_upload.cid.as_str()), "Manifest published");

        let anchored_hash = manifest.manifest_hash();
        let outcome = self.registry.anchor(&anchored_hash, identity, cancel).await?;
        let already_anchored = matches!(outcome, AnchorOutcome::AlreadyAnchored(_));
        self.store.put_registry_entry(outcome.entry()).await?;
        let state = self.advance_item(content_hash, ContentState::RegistryAnchored)?;
        info!(anchored_hash = %anchored_hash, already_anchored, "Manifest anchored");

        Ok(Registration {
            content_hash,
            upload,
            manifest,
            manifest_uri,
            manifest_upload,
            anchored_hash,
            already_anchored,
            state,
        })
    }

    /// Manifest stored by an earlier registration of the same content, if it
    /// still matches this upload, identity and signer.
    async fn published_manifest(
        &self,
        upload: &UploadResult,
        content_hash: ContentHash,
        identity: &Identity,
        owner_key: Option<&OwnerKey>,
    ) -> Result<Option<Manifest>> {
        let Some(uri) = self.store.manifest_uri_for(&content_hash).await? else {
            return Ok(None);
        };
        let Some(manifest) = self.store.get_manifest(&uri).await? else {
            return Ok(None);
        };
        let same_signer = match owner_key {
            Some(key) => manifest.signature.as_ref().map(|s| s.signer) == Some(key.address()),
            None => true,
        };
        let reusable = manifest.cid == upload.cid && manifest.identity == *identity && same_signer;
        Ok(reusable.then_some(manifest))
    }

    /// Record a binding for `proof_url`, verify it and persist the outcome.
    #[instrument(skip(self, manifest_uri, cancel), fields(manifest_uri = %mask(manifest_uri)))]
    pub async fn submit_binding(
        &self,
        proof_url: &str,
        manifest_uri: &str,
        cancel: &CancelToken,
    ) -> Result<VerificationRecord> {
        let content = self.verifier.platforms().parse(proof_url)?;
        let binding = PlatformBinding::new(content, proof_url, manifest_uri);
        if let Some(previous) = self.store.upsert_binding(&binding).await? {
            info!(superseded = %previous, binding_id = %binding.id, "Binding superseded");
        }
        self.advance_binding(binding.id, ContentState::BindingSubmitted)?;
        self.verify_binding(&binding, cancel).await
    }

    /// Verify the current binding for (platform, external id) again. Only a
    /// failed binding may be re-verified.
    #[instrument(skip(self, cancel))]
    pub async fn reverify(
        &self,
        platform: &str,
        external_id: &str,
        cancel: &CancelToken,
    ) -> Result<VerificationRecord> {
        let binding = self
            .store
            .get_binding(platform, external_id)
            .await?
            .ok_or_else(|| ProvenanceError::BindingNotFound {
                platform: platform.to_string(),
                external_id: external_id.to_string(),
            })?;
        self.advance_binding(binding.id, ContentState::BindingSubmitted)?;
        self.verify_binding(&binding, cancel).await
    }

    async fn verify_binding(&self, binding: &PlatformBinding, cancel: &CancelToken) -> Result<VerificationRecord> {
        let record = self.verifier.verify(binding, cancel).await;
        let next = if record.is_verified() {
            ContentState::Verified
        } else {
            ContentState::VerificationFailed
        };
        self.advance_binding(binding.id, next)?;
        self.store.append_verification(&record).await?;

        if let Some(reason) = record.failure() {
            warn!(binding_id = %binding.id, reason = %reason, "Binding rejected");
        }
        Ok(record)
    }
}
