//! Manifest resolution from `http(s)://` and `ipfs://` URIs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use super::cache::ManifestCache;
use super::validate::parse_manifest;
use super::Manifest;
use crate::cancel::{CancelToken, Interrupted};
use crate::error::{ManifestValidationError, ResolveError};
use crate::mask::mask;
use crate::retry::{retry, Attempt, BackoffPolicy, RetryFailure};
use crate::upload::http::{is_transient_error, is_transient_status};

/// Default public gateway for `ipfs://` URIs.
pub const DEFAULT_GATEWAY: &str = "https://ipfs.io/ipfs";

/// Something that can produce a validated manifest for a URI.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch_manifest(&self, uri: &str, cancel: &CancelToken)
        -> Result<Manifest, ResolveError>;
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Base URL that `ipfs://<cid>` is rewritten onto.
    pub gateway_base: String,
    pub timeout: Duration,
    /// How far in the future `created_at` may lie.
    pub clock_skew: Duration,
    pub policy: BackoffPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            gateway_base: DEFAULT_GATEWAY.to_string(),
            timeout: Duration::from_secs(15),
            clock_skew: Duration::from_secs(300),
            policy: BackoffPolicy::default(),
        }
    }
}

pub struct ManifestResolver {
    client: Client,
    config: ResolverConfig,
    cache: Option<Arc<ManifestCache>>,
}

impl ManifestResolver {
    pub fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ResolveError::Fetch {
                uri: config.gateway_base.clone(),
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            config,
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: Arc<ManifestCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Map a manifest URI to the HTTP(S) location it is fetched from.
    ///
    /// `ipfs://<cid>[/path]` becomes `<gateway>/<cid>[/path]`; any scheme other
    /// than `http`, `https` or `ipfs` is rejected.
    pub fn resolve_location(&self, uri: &str) -> Result<Url, ManifestValidationError> {
        let invalid = |reason: String| ManifestValidationError::new("uri", reason);

        if let Some(rest) = uri.strip_prefix("ipfs://") {
            let rest = rest.strip_prefix("ipfs/").unwrap_or(rest);
            if rest.is_empty() || rest.starts_with('/') {
                return Err(invalid(format!("`{}` has no content identifier", mask(uri))));
            }
            let base = self.config.gateway_base.trim_end_matches('/');
            return Url::parse(&format!("{base}/{rest}"))
                .map_err(|e| invalid(format!("gateway URL for `{}` is invalid: {e}", mask(uri))));
        }

        let url = Url::parse(uri).map_err(|e| invalid(format!("`{}` is not a URL: {e}", mask(uri))))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(invalid(format!("unsupported scheme `{other}`"))),
        }
    }

    /// Fetch and validate the manifest at `uri`, through the cache when configured.
    #[instrument(skip(self, uri, cancel), fields(uri = %mask(uri)))]
    pub async fn resolve(&self, uri: &str, cancel: &CancelToken) -> Result<Manifest, ResolveError> {
        let location = self.resolve_location(uri)?;
        match &self.cache {
            Some(cache) => {
                cache
                    .get_or_fetch(uri, || self.fetch_with_retry(uri, &location, cancel))
                    .await
            }
            None => self.fetch_with_retry(uri, &location, cancel).await,
        }
    }

    async fn fetch_with_retry(
        &self,
        uri: &str,
        location: &Url,
        cancel: &CancelToken,
    ) -> Result<Manifest, ResolveError> {
        let result = retry(&self.config.policy, cancel, "resolve_manifest", |_| {
            self.fetch_once(uri, location, cancel)
        })
        .await;

        match result {
            Ok((manifest, _)) => Ok(manifest),
            Err(RetryFailure::Permanent { error, .. }) | Err(RetryFailure::Exhausted { error, .. }) => {
                Err(error)
            }
            Err(RetryFailure::Cancelled { reason, .. }) => Err(ResolveError::Cancelled(reason)),
        }
    }

    async fn fetch_once(
        &self,
        uri: &str,
        location: &Url,
        cancel: &CancelToken,
    ) -> Result<Manifest, Attempt<ResolveError>> {
        let start = Instant::now();
        let fetch_error = |message: String| ResolveError::Fetch {
            uri: mask(uri).to_string(),
            message,
        };

        let request = async {
            let response = self.client.get(location.clone()).send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match cancel.run_bounded(self.config.timeout, request).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) if is_transient_error(&e) => {
                return Err(Attempt::Transient(fetch_error(e.without_url().to_string())));
            }
            Ok(Err(e)) => return Err(Attempt::Permanent(fetch_error(e.without_url().to_string()))),
            Err(Interrupted::TimedOut(limit)) => {
                return Err(Attempt::Transient(fetch_error(format!(
                    "timed out after {}ms",
                    limit.as_millis()
                ))));
            }
            Err(Interrupted::Cancelled(reason)) => {
                return Err(Attempt::Permanent(ResolveError::Cancelled(reason)));
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        if !status.is_success() {
            let error = ResolveError::Status {
                uri: mask(uri).to_string(),
                status: status.as_u16(),
            };
            warn!(status = %status, latency_ms, "Manifest fetch failed");
            return Err(if is_transient_status(status) {
                Attempt::Transient(error)
            } else {
                Attempt::Permanent(error)
            });
        }

        let skew = chrono::Duration::from_std(self.config.clock_skew)
            .unwrap_or_else(|_| chrono::Duration::seconds(0));
        let manifest = parse_manifest(&body, Utc::now(), skew)
            .map_err(|e| Attempt::Permanent(ResolveError::Validation(e)))?;

        debug!(latency_ms, "Manifest resolved");
        Ok(manifest)
    }
}

#[async_trait]
impl ManifestSource for ManifestResolver {
    async fn fetch_manifest(
        &self,
        uri: &str,
        cancel: &CancelToken,
    ) -> Result<Manifest, ResolveError> {
        self.resolve(uri, cancel).await
    }
}
