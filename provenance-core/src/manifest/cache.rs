//! Bounded TTL read-through cache for resolved manifests.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::Manifest;
use crate::mask::mask;

/// Default number of cached manifests.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Default lifetime of a cached manifest.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct CacheEntry {
    manifest: Manifest,
    inserted_at: Instant,
}

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Younger than the refresh threshold; serve directly.
    Fresh(Manifest),
    /// Within TTL but due for refresh; serve only if the re-fetch fails.
    Stale(Manifest),
    Miss,
}

/// Manifests keyed by URI. Entries past TTL are evicted and never served.
pub struct ManifestCache {
    entries: DashMap<String, CacheEntry>,
    capacity: usize,
    ttl: Duration,
    refresh_after: Duration,
}

impl ManifestCache {
    /// `refresh_after` is clamped to `ttl`.
    pub fn new(capacity: usize, ttl: Duration, refresh_after: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
            refresh_after: refresh_after.min(ttl),
        }
    }

    /// Cache with the refresh threshold at half the TTL.
    pub fn with_ttl(capacity: usize, ttl: Duration) -> Self {
        Self::new(capacity, ttl, ttl / 2)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, uri: &str) -> CacheLookup {
        let age = match self.entries.get(uri) {
            Some(entry) => entry.inserted_at.elapsed(),
            None => return CacheLookup::Miss,
        };

        if age >= self.ttl {
            self.entries.remove_if(uri, |_, entry| entry.inserted_at.elapsed() >= self.ttl);
            debug!(uri = %mask(uri), "Evicted expired manifest");
            return CacheLookup::Miss;
        }

        match self.entries.get(uri) {
            Some(entry) if age < self.refresh_after => CacheLookup::Fresh(entry.manifest.clone()),
            Some(entry) => CacheLookup::Stale(entry.manifest.clone()),
            None => CacheLookup::Miss,
        }
    }

    /// Insert or replace the entry for `uri`, evicting the oldest entry when full.
    pub fn insert(&self, uri: &str, manifest: Manifest) {
        if !self.entries.contains_key(uri) && self.entries.len() >= self.capacity {
            self.evict_expired();
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }
        self.entries.insert(
            uri.to_string(),
            CacheEntry {
                manifest,
                inserted_at: Instant::now(),
            },
        );
    }

    fn evict_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.inserted_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    /// Serve from cache, fetching on miss or when the entry is due for refresh.
    ///
    /// A stale entry is returned only when the refresh fails, and only if it
    /// is still within TTL once the refresh has given up.
    pub async fn get_or_fetch<E, F, Fut>(&self, uri: &str, fetch: F) -> Result<Manifest, E>
    where
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Manifest, E>>,
    {
        match self.get(uri) {
            CacheLookup::Fresh(manifest) => {
                debug!(uri = %mask(uri), "Manifest cache hit");
                Ok(manifest)
            }
            CacheLookup::Stale(_) => match fetch().await {
                Ok(manifest) => {
                    self.insert(uri, manifest.clone());
                    Ok(manifest)
                }
                Err(e) => match self.get(uri) {
                    CacheLookup::Fresh(current) | CacheLookup::Stale(current) => {
                        warn!(uri = %mask(uri), error = %e, "Manifest refresh failed, serving stale entry");
                        Ok(current)
                    }
                    CacheLookup::Miss => {
                        warn!(uri = %mask(uri), error = %e, "Manifest refresh failed after entry expired");
                        Err(e)
                    }
                },
            },
            CacheLookup::Miss => {
                let manifest = fetch().await?;
                self.insert(uri, manifest.clone());
                Ok(manifest)
            }
        }
    }
}

impl Default for ManifestCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }
}
