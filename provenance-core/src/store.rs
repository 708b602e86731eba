//! Persistence interface for pipeline entities.
//!
//! Storage mechanics live behind [`ContentStore`]; [`MemoryContentStore`] is
//! the in-process implementation used by the CLI and tests.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::StoreError;
use crate::hash::ContentHash;
use crate::manifest::Manifest;
use crate::platform::{PlatformBinding, VerificationRecord};
use crate::registry::RegistryEntry;
use crate::upload::UploadResult;

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put_upload(&self, hash: ContentHash, result: &UploadResult) -> Result<(), StoreError>;

    async fn get_upload(&self, hash: &ContentHash) -> Result<Option<UploadResult>, StoreError>;

    async fn put_manifest(&self, uri: &str, manifest: &Manifest) -> Result<(), StoreError>;

    async fn get_manifest(&self, uri: &str) -> Result<Option<Manifest>, StoreError>;

    /// URI of the manifest most recently stored for a content hash.
    async fn manifest_uri_for(&self, content_hash: &ContentHash) -> Result<Option<String>, StoreError>;

    /// Returns `false` without touching the store when an entry for the same
    /// hash already exists.
    async fn put_registry_entry(&self, entry: &RegistryEntry) -> Result<bool, StoreError>;

    async fn get_registry_entry(&self, hash: &ContentHash) -> Result<Option<RegistryEntry>, StoreError>;

    /// Make `binding` current for its (platform, external id). Returns the id
    /// of the binding it superseded, which stays in history.
    async fn upsert_binding(&self, binding: &PlatformBinding) -> Result<Option<Uuid>, StoreError>;

    async fn get_binding(&self, platform: &str, external_id: &str) -> Result<Option<PlatformBinding>, StoreError>;

    /// Every binding ever submitted for (platform, external id), oldest first.
    async fn binding_history(&self, platform: &str, external_id: &str) -> Result<Vec<PlatformBinding>, StoreError>;

    async fn append_verification(&self, record: &VerificationRecord) -> Result<(), StoreError>;

    async fn verifications_for(&self, binding_id: Uuid) -> Result<Vec<VerificationRecord>, StoreError>;
}

type BindingKey = (String, String);

#[derive(Default)]
pub struct MemoryContentStore {
    uploads: DashMap<ContentHash, UploadResult>,
    manifests: DashMap<String, Manifest>,
    manifests_by_content: DashMap<ContentHash, String>,
    registry: DashMap<ContentHash, RegistryEntry>,
    current_bindings: DashMap<BindingKey, PlatformBinding>,
    binding_history: DashMap<BindingKey, Vec<PlatformBinding>>,
    verifications: DashMap<Uuid, Vec<VerificationRecord>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn binding_key(platform: &str, external_id: &str) -> BindingKey {
    (platform.to_string(), external_id.to_string())
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put_upload(&self, hash: ContentHash, result: &UploadResult) -> Result<(), StoreError> {
        self.uploads.insert(hash, result.clone());
        Ok(())
    }

    async fn get_upload(&self, hash: &ContentHash) -> Result<Option<UploadResult>, StoreError> {
        Ok(self.uploads.get(hash).map(|entry| entry.value().clone()))
    }

    async fn put_manifest(&self, uri: &str, manifest: &Manifest) -> Result<(), StoreError> {
        match self.manifests.entry(uri.to_string()) {
            Entry::Occupied(existing) if existing.get() != manifest => Err(StoreError::Conflict(format!(
                "a different manifest is already stored at {uri}"
            ))),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(manifest.clone());
                self.manifests_by_content
                    .insert(manifest.content_hash, uri.to_string());
                Ok(())
            }
        }
    }

    async fn get_manifest(&self, uri: &str) -> Result<Option<Manifest>, StoreError> {
        Ok(self.manifests.get(uri).map(|entry| entry.value().clone()))
    }

    async fn manifest_uri_for(&self, content_hash: &ContentHash) -> Result<Option<String>, StoreError> {
        Ok(self
            .manifests_by_content
            .get(content_hash)
            .map(|entry| entry.value().clone()))
    }

    async fn put_registry_entry(&self, entry: &RegistryEntry) -> Result<bool, StoreError> {
        match self.registry.entry(entry.content_hash) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                Ok(true)
            }
        }
    }

    async fn get_registry_entry(&self, hash: &ContentHash) -> Result<Option<RegistryEntry>, StoreError> {
        Ok(self.registry.get(hash).map(|entry| entry.value().clone()))
    }

    async fn upsert_binding(&self, binding: &PlatformBinding) -> Result<Option<Uuid>, StoreError> {
        let key = binding_key(&binding.platform, &binding.external_id);
        self.binding_history
            .entry(key.clone())
            .or_default()
            .push(binding.clone());
        let superseded = self.current_bindings.insert(key, binding.clone());
        Ok(superseded.map(|previous| previous.id))
    }

    async fn get_binding(&self, platform: &str, external_id: &str) -> Result<Option<PlatformBinding>, StoreError> {
        Ok(self
            .current_bindings
            .get(&binding_key(platform, external_id))
            .map(|entry| entry.value().clone()))
    }

    async fn binding_history(&self, platform: &str, external_id: &str) -> Result<Vec<PlatformBinding>, StoreError> {
        Ok(self
            .binding_history
            .get(&binding_key(platform, external_id))
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn append_verification(&self, record: &VerificationRecord) -> Result<(), StoreError> {
        self.verifications
            .entry(record.binding_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn verifications_for(&self, binding_id: Uuid) -> Result<Vec<VerificationRecord>, StoreError> {
        Ok(self
            .verifications
            .get(&binding_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
