//! Resilient content-addressed upload.
//!
//! The [`UploadOrchestrator`] walks an ordered pool of providers strictly in
//! priority order. Each provider gets a bounded number of attempts under the
//! shared [`BackoffPolicy`]; transient failures are retried, permanent ones
//! move on to the next provider immediately. The first accepted upload wins
//! and every earlier failure is kept as diagnostics.

pub mod config;
pub mod http;
pub mod mock;
pub mod response;

pub use config::{AuthScheme, ProviderConfig, UploadConfig};
pub use http::HttpUploadProvider;
pub use mock::MockUploadProvider;
pub use response::{parse_upload_response, ResponseShape, UploadRecord};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::cancel::CancelToken;
use crate::cid::Cid;
use crate::error::{ProviderError, UploadError};
use crate::mask::mask;
use crate::retry::{retry, Attempt, BackoffPolicy, RetryFailure};

/// A content-addressed store that accepts raw bytes and returns their CID.
#[async_trait]
pub trait UploadProvider: Send + Sync {
    /// Stable name used in diagnostics.
    fn name(&self) -> &str;

    /// Upload `content` once. No retries happen inside a provider.
    async fn submit(&self, content: &[u8]) -> Result<Cid, ProviderError>;
}

/// Why one provider was given up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: String,
    pub attempts: u32,
    pub error: ProviderError,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub cid: Cid,
    pub provider: String,
    /// Attempts spent on the winning provider.
    pub attempts: u32,
    pub elapsed: Duration,
    /// Providers tried before the winning one.
    #[serde(skip)]
    pub failures: Vec<ProviderFailure>,
}

struct RankedProvider {
    priority: u32,
    provider: Arc<dyn UploadProvider>,
}

pub struct UploadOrchestrator {
    providers: Vec<RankedProvider>,
    policy: BackoffPolicy,
}

impl UploadOrchestrator {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            providers: Vec::new(),
            policy,
        }
    }

    /// Build HTTP providers for every configured endpoint.
    pub fn from_config(config: &UploadConfig) -> Result<Self, ProviderError> {
        config
            .providers
            .iter()
            .try_fold(Self::new(config.policy.clone()), |orchestrator, provider| {
                let priority = provider.priority;
                let http = HttpUploadProvider::new(provider.clone())?;
                Ok(orchestrator.with_provider(priority, Arc::new(http)))
            })
    }

    /// Add a provider. Equal priorities keep insertion order.
    pub fn with_provider(mut self, priority: u32, provider: Arc<dyn UploadProvider>) -> Self {
        self.providers.push(RankedProvider { priority, provider });
        self.providers.sort_by_key(|p| p.priority);
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.provider.name()).collect()
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Upload `content` to the first provider that accepts it.
    #[instrument(skip(self, content, cancel), fields(bytes = content.len()))]
    pub async fn upload(
        &self,
        content: &[u8],
        cancel: &CancelToken,
    ) -> Result<UploadResult, UploadError> {
        if self.providers.is_empty() {
            return Err(UploadError::NoProviders);
        }

        let start = Instant::now();
        let mut failures = Vec::new();

        for ranked in &self.providers {
            let provider = ranked.provider.as_ref();
            let name = provider.name();

            let outcome = retry(&self.policy, cancel, "upload", |_| async move {
                provider.submit(content).await.map_err(|e| {
                    if e.is_transient() {
                        Attempt::Transient(e)
                    } else {
                        Attempt::Permanent(e)
                    }
                })
            })
            .await;

            match outcome {
                Ok((cid, attempts)) => {
                    let elapsed = start.elapsed();
                    info!(
                        provider = name,
                        attempts,
                        cid = %mask(cid.as_str()),
                        latency_ms = elapsed.as_millis() as u64,
                        "Upload completed"
                    );
                    return Ok(UploadResult {
                        cid,
                        provider: name.to_string(),
                        attempts,
                        elapsed,
                        failures,
                    });
                }
                Err(RetryFailure::Cancelled { reason, .. }) => {
                    warn!(provider = name, reason = %reason, "Upload interrupted");
                    return Err(UploadError::Cancelled(reason));
                }
                Err(RetryFailure::Permanent { error, attempts })
                | Err(RetryFailure::Exhausted { error, attempts }) => {
                    warn!(provider = name, attempts, error = %error, "Provider failed, falling back");
                    failures.push(ProviderFailure {
                        provider: name.to_string(),
                        attempts,
                        error,
                    });
                }
            }
        }

        Err(UploadError::AllProvidersExhausted { failures })
    }
}
