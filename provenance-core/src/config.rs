//! Pipeline configuration loaded from environment variables.
//!
//! Components never read the environment themselves; they receive the values
//! assembled here through their constructors.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::error::{ConfigError, VerificationError};
use crate::manifest::cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use crate::manifest::{ManifestCache, ResolverConfig};
use crate::mask::redact;
use crate::platform::{HttpProofSource, ProofEndpoint, VerifierConfig};
use crate::registry::evm::EvmRegistryConfig;
use crate::retry::BackoffPolicy;
use crate::signature::Address;
use crate::upload::config::DEFAULT_UPLOAD_TIMEOUT;
use crate::upload::{AuthScheme, ProviderConfig, UploadConfig};

const DEFAULT_KEY_HEADER: &str = "x-api-key";
const DEFAULT_SECRET_HEADER: &str = "x-api-secret";
const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_VERIFY_DEADLINE: Duration = Duration::from_secs(120);
const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Clone)]
pub struct PipelineConfig {
    pub upload: UploadConfig,
    pub resolver: ResolverConfig,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Unset when no registry node is configured.
    pub registry: Option<EvmRegistryConfig>,
    pub verifier: VerifierConfig,
    /// Aggregate budget for one verification batch.
    pub verify_deadline: Duration,
    pub youtube_api_key: Option<Zeroizing<String>>,
    pub vimeo_access_token: Option<Zeroizing<String>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload: UploadConfig::default(),
            resolver: ResolverConfig::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
            registry: None,
            verifier: VerifierConfig::default(),
            verify_deadline: DEFAULT_VERIFY_DEADLINE,
            youtube_api_key: None,
            vimeo_access_token: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("upload", &self.upload)
            .field("resolver", &self.resolver)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_ttl", &self.cache_ttl)
            .field("registry", &self.registry)
            .field("verifier", &self.verifier)
            .field("verify_deadline", &self.verify_deadline)
            .field("youtube_api_key", &self.youtube_api_key.as_deref().map(|k| redact(k)))
            .field("vimeo_access_token", &self.vimeo_access_token.as_deref().map(|t| redact(t)))
            .finish()
    }
}

/// Reads raw values by key and parses them into typed settings.
struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        self.string(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn secs(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parsed::<u64>(key)?.map(Duration::from_secs))
    }

    fn address(&self, key: &str) -> Result<Address, ConfigError> {
        self.string(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))?
            .parse()
            .map_err(|e: crate::error::CryptoError| ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}

/// `UPLOAD_PROVIDER_<NAME>_` prefix for a provider name.
fn provider_prefix(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("UPLOAD_PROVIDER_{normalized}_")
}

impl PipelineConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source { lookup };
        let defaults = Self::default();

        let mut policy = BackoffPolicy::default();
        if let Some(attempts) = source.parsed::<u32>("UPLOAD_MAX_ATTEMPTS")? {
            if attempts == 0 {
                return Err(ConfigError::Invalid {
                    key: "UPLOAD_MAX_ATTEMPTS".into(),
                    reason: "must be at least 1".into(),
                });
            }
            policy.max_attempts = attempts;
        }
        if let Some(ms) = source.parsed::<u64>("UPLOAD_BASE_DELAY_MS")? {
            policy.base_delay = Duration::from_millis(ms);
        }
        let upload_timeout = source.secs("UPLOAD_TIMEOUT_SECS")?.unwrap_or(DEFAULT_UPLOAD_TIMEOUT);

        let providers = source
            .string("UPLOAD_PROVIDERS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .enumerate()
                    .map(|(priority, name)| load_provider(&source, name, priority as u32, upload_timeout))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let mut resolver = ResolverConfig {
            policy: policy.clone(),
            ..ResolverConfig::default()
        };
        if let Some(gateway) = source.string("IPFS_GATEWAY_URL") {
            resolver.gateway_base = gateway;
        }
        if let Some(skew) = source.secs("MANIFEST_CLOCK_SKEW_SECS")? {
            resolver.clock_skew = skew;
        }

        let registry = match source.string("REGISTRY_RPC_URL") {
            Some(rpc_url) => Some(EvmRegistryConfig {
                rpc_url,
                contract_address: source.address("REGISTRY_CONTRACT_ADDRESS")?,
                account: source.address("REGISTRY_ACCOUNT")?,
                timeout: DEFAULT_REGISTRY_TIMEOUT,
            }),
            None => None,
        };

        let mut verifier = VerifierConfig::default();
        if let Some(days) = source.parsed::<u64>("PROOF_MAX_AGE_DAYS")? {
            verifier.max_age = Duration::from_secs(days.saturating_mul(SECS_PER_DAY));
        }
        if let Some(skew) = source.secs("PROOF_CLOCK_SKEW_SECS")? {
            verifier.clock_skew = skew;
        }
        if let Some(concurrency) = source.parsed::<usize>("VERIFY_CONCURRENCY")? {
            verifier.max_concurrency = concurrency.max(1);
        }

        Ok(Self {
            upload: UploadConfig { providers, policy },
            resolver,
            cache_capacity: source
                .parsed("MANIFEST_CACHE_CAPACITY")?
                .unwrap_or(defaults.cache_capacity),
            cache_ttl: source.secs("MANIFEST_CACHE_TTL_SECS")?.unwrap_or(defaults.cache_ttl),
            registry,
            verifier,
            verify_deadline: source
                .secs("VERIFY_DEADLINE_SECS")?
                .unwrap_or(defaults.verify_deadline),
            youtube_api_key: source.string("YOUTUBE_API_KEY").map(Zeroizing::new),
            vimeo_access_token: source.string("VIMEO_ACCESS_TOKEN").map(Zeroizing::new),
        })
    }

    pub fn manifest_cache(&self) -> Arc<ManifestCache> {
        Arc::new(ManifestCache::with_ttl(self.cache_capacity, self.cache_ttl))
    }

    /// HTTP proof source with an endpoint for every platform that has
    /// credentials configured.
    pub fn proof_source(&self) -> Result<HttpProofSource, VerificationError> {
        let mut source = HttpProofSource::new(self.resolver.policy.clone(), self.verifier.call_timeout)?;
        if let Some(key) = &self.youtube_api_key {
            source = source.with_endpoint("youtube", ProofEndpoint::youtube(key.as_str()));
        }
        if let Some(token) = &self.vimeo_access_token {
            source = source.with_endpoint("vimeo", ProofEndpoint::vimeo(token.as_str()));
        }
        Ok(source)
    }
}

fn load_provider<F>(
    source: &Source<F>,
    name: &str,
    priority: u32,
    timeout: Duration,
) -> Result<ProviderConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = provider_prefix(name);
    let key = |suffix: &str| format!("{prefix}{suffix}");

    let endpoint_key = key("ENDPOINT");
    let endpoint = source
        .string(&endpoint_key)
        .ok_or(ConfigError::Missing(endpoint_key))?;

    let auth = match (
        source.string(&key("TOKEN")),
        source.string(&key("KEY")),
        source.string(&key("SECRET")),
    ) {
        (Some(token), None, None) => AuthScheme::bearer(token),
        (None, Some(api_key), Some(secret)) => AuthScheme::key_secret(
            source
                .string(&key("KEY_HEADER"))
                .unwrap_or_else(|| DEFAULT_KEY_HEADER.to_string()),
            api_key,
            source
                .string(&key("SECRET_HEADER"))
                .unwrap_or_else(|| DEFAULT_SECRET_HEADER.to_string()),
            secret,
        ),
        (None, None, None) => AuthScheme::None,
        _ => {
            return Err(ConfigError::Invalid {
                key: format!("{prefix}*"),
                reason: "set either TOKEN or both KEY and SECRET".into(),
            })
        }
    };

    Ok(ProviderConfig::new(name, endpoint, priority)
        .with_auth(auth)
        .with_timeout(timeout))
}
