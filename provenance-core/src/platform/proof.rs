//! Platform proofs: the signed token an owner pastes into a video
//! description, and the sources that fetch that description.
//!
//! Token format (one whitespace-delimited word):
//!
//! ```text
//! provenance-proof:v1:<content_hash>:<unix_seconds>:<0x signature>
//! ```
//!
//! The signature is EIP-191 over `provenance:v1:<content_hash>:<unix_seconds>`.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use super::ExternalContentRef;
use crate::cancel::{CancelToken, Interrupted};
use crate::error::{CryptoError, VerificationError};
use crate::hash::ContentHash;
use crate::mask::redact;
use crate::retry::{retry, Attempt, BackoffPolicy, RetryFailure};
use crate::signature::{decode_signature_hex, encode_signature_hex, recover_signer, Address, OwnerKey};
use crate::upload::http::{is_transient_error, is_transient_status};

pub const PROOF_PREFIX: &str = "provenance-proof:v1:";
const PAYLOAD_PREFIX: &str = "provenance:v1:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProof {
    pub content_hash: ContentHash,
    /// Unix seconds at signing time.
    pub timestamp: i64,
    pub signature: Vec<u8>,
}

impl PlatformProof {
    pub fn create(content_hash: ContentHash, timestamp: i64, key: &OwnerKey) -> Result<Self, CryptoError> {
        let payload = signed_payload(&content_hash, timestamp);
        let signature = key.sign_message(payload.as_bytes())?.to_vec();
        Ok(Self {
            content_hash,
            timestamp,
            signature,
        })
    }

    pub fn signed_payload(&self) -> String {
        signed_payload(&self.content_hash, self.timestamp)
    }

    pub fn recover_signer(&self) -> Result<Address, CryptoError> {
        recover_signer(self.signed_payload().as_bytes(), &self.signature)
    }

    /// Token to paste into a platform description.
    pub fn to_line(&self) -> String {
        format!(
            "{PROOF_PREFIX}{}:{}:{}",
            self.content_hash,
            self.timestamp,
            encode_signature_hex(&self.signature)
        )
    }

    /// Find and parse the first proof token in `text`.
    pub fn extract(text: &str) -> Result<Self, VerificationError> {
        let token = text
            .split_whitespace()
            .find(|word| word.starts_with(PROOF_PREFIX))
            .ok_or(VerificationError::ProofMissing)?;
        Self::parse_token(token)
    }

    fn parse_token(token: &str) -> Result<Self, VerificationError> {
        let malformed = |reason: String| VerificationError::MalformedProof { reason };
        let body = token
            .strip_prefix(PROOF_PREFIX)
            .ok_or_else(|| malformed("missing proof prefix".into()))?;

        let mut parts = body.split(':');
        let (Some(hash), Some(timestamp), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed("expected <hash>:<timestamp>:<signature>".into()));
        };

        let content_hash =
            ContentHash::from_hex(hash).map_err(|e| malformed(format!("content hash: {e}")))?;
        let timestamp: i64 = timestamp
            .parse()
            .map_err(|e| malformed(format!("timestamp `{timestamp}`: {e}")))?;
        let signature =
            decode_signature_hex(signature).map_err(|e| malformed(format!("signature: {e}")))?;

        Ok(Self {
            content_hash,
            timestamp,
            signature,
        })
    }
}

fn signed_payload(content_hash: &ContentHash, timestamp: i64) -> String {
    format!("{PAYLOAD_PREFIX}{content_hash}:{timestamp}")
}

/// Fetches the public text (description) of platform content.
#[async_trait]
pub trait ProofSource: Send + Sync {
    async fn fetch_proof_text(
        &self,
        content: &ExternalContentRef,
        cancel: &CancelToken,
    ) -> Result<String, VerificationError>;
}

/// Read-only credential for a platform metadata API.
#[derive(Clone, Default)]
pub enum ProofAuth {
    #[default]
    None,
    /// API key passed as a query parameter (`?key=…`).
    QueryKey {
        param: String,
        key: Zeroizing<String>,
    },
    Bearer(Zeroizing<String>),
}

impl fmt::Debug for ProofAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::QueryKey { param, key } => f
                .debug_struct("QueryKey")
                .field("param", param)
                .field("key", &redact(key))
                .finish(),
            Self::Bearer(token) => f.debug_tuple("Bearer").field(&redact(token)).finish(),
        }
    }
}

/// Where and how to read one platform's descriptions.
#[derive(Debug, Clone)]
pub struct ProofEndpoint {
    /// URL with an `{id}` placeholder for the external id.
    pub url_template: String,
    pub auth: ProofAuth,
    /// JSON pointer to the description text in the response.
    pub description_pointer: String,
}

impl ProofEndpoint {
    /// YouTube Data API v3 `videos.list` (snippet part).
    pub fn youtube(api_key: impl Into<String>) -> Self {
        Self {
            url_template: "https://www.googleapis.com/youtube/v3/videos?part=snippet&id={id}".into(),
            auth: ProofAuth::QueryKey {
                param: "key".into(),
                key: Zeroizing::new(api_key.into()),
            },
            description_pointer: "/items/0/snippet/description".into(),
        }
    }

    /// Vimeo API `GET /videos/{id}`.
    pub fn vimeo(access_token: impl Into<String>) -> Self {
        Self {
            url_template: "https://api.vimeo.com/videos/{id}".into(),
            auth: ProofAuth::Bearer(Zeroizing::new(access_token.into())),
            description_pointer: "/description".into(),
        }
    }

    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = template.into();
        self
    }
}

pub struct HttpProofSource {
    client: Client,
    endpoints: HashMap<String, ProofEndpoint>,
    policy: BackoffPolicy,
    timeout: Duration,
}

impl HttpProofSource {
    pub fn new(policy: BackoffPolicy, timeout: Duration) -> Result<Self, VerificationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerificationError::ProofUnavailable {
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoints: HashMap::new(),
            policy,
            timeout,
        })
    }

    pub fn with_endpoint(mut self, platform: impl Into<String>, endpoint: ProofEndpoint) -> Self {
        self.endpoints.insert(platform.into(), endpoint);
        self
    }

    async fn fetch_once(
        &self,
        endpoint: &ProofEndpoint,
        content: &ExternalContentRef,
        cancel: &CancelToken,
    ) -> Result<String, Attempt<VerificationError>> {
        let unavailable = |message: String| VerificationError::ProofUnavailable { message };
        let start = Instant::now();
        let url = endpoint.url_template.replace("{id}", &content.external_id);

        let mut request = self.client.get(&url);
        request = match &endpoint.auth {
            ProofAuth::None => request,
            ProofAuth::QueryKey { param, key } => request.query(&[(param.as_str(), key.as_str())]),
            ProofAuth::Bearer(token) => request.bearer_auth(token.as_str()),
        };

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match cancel.run_bounded(self.timeout, exchange).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) if is_transient_error(&e) => {
                return Err(Attempt::Transient(unavailable(e.without_url().to_string())))
            }
            Ok(Err(e)) => return Err(Attempt::Permanent(unavailable(e.without_url().to_string()))),
            Err(Interrupted::TimedOut(limit)) => {
                return Err(Attempt::Transient(unavailable(format!(
                    "timed out after {}ms",
                    limit.as_millis()
                ))))
            }
            Err(Interrupted::Cancelled(reason)) => {
                return Err(Attempt::Permanent(VerificationError::Cancelled {
                    reason: reason.to_string(),
                }))
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        if !status.is_success() {
            warn!(status = %status, latency_ms, "Platform metadata request failed");
            let error = unavailable(format!("{} API returned status {status}", content.platform));
            return Err(if is_transient_status(status) {
                Attempt::Transient(error)
            } else {
                Attempt::Permanent(error)
            });
        }

        let document: Value = serde_json::from_str(&body)
            .map_err(|e| Attempt::Permanent(unavailable(format!("malformed metadata: {e}"))))?;
        let description = document
            .pointer(&endpoint.description_pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Attempt::Permanent(unavailable(format!(
                    "no description for {} {}",
                    content.platform, content.external_id
                )))
            })?;

        debug!(latency_ms, "Fetched platform description");
        Ok(description.to_string())
    }
}

#[async_trait]
impl ProofSource for HttpProofSource {
    #[instrument(skip(self, cancel), fields(platform = %content.platform, external_id = %content.external_id))]
    async fn fetch_proof_text(
        &self,
        content: &ExternalContentRef,
        cancel: &CancelToken,
    ) -> Result<String, VerificationError> {
        let endpoint = self.endpoints.get(&content.platform).ok_or_else(|| {
            VerificationError::ProofUnavailable {
                message: format!("no metadata endpoint configured for {}", content.platform),
            }
        })?;

        let result = retry(&self.policy, cancel, "fetch_proof", |_| {
            self.fetch_once(endpoint, content, cancel)
        })
        .await;

        match result {
            Ok((text, _)) => Ok(text),
            Err(RetryFailure::Permanent { error, .. }) | Err(RetryFailure::Exhausted { error, .. }) => {
                Err(error)
            }
            Err(RetryFailure::Cancelled { reason, .. }) => Err(VerificationError::Cancelled {
                reason: reason.to_string(),
            }),
        }
    }
}

/// Fixed descriptions keyed by platform and external id.
#[derive(Debug, Default)]
pub struct StaticProofSource {
    texts: HashMap<(String, String), String>,
}

impl StaticProofSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(
        mut self,
        platform: impl Into<String>,
        external_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.texts
            .insert((platform.into(), external_id.into()), text.into());
        self
    }
}

#[async_trait]
impl ProofSource for StaticProofSource {
    async fn fetch_proof_text(
        &self,
        content: &ExternalContentRef,
        cancel: &CancelToken,
    ) -> Result<String, VerificationError> {
        cancel.check().map_err(|reason| VerificationError::Cancelled {
            reason: reason.to_string(),
        })?;
        self.texts
            .get(&(content.platform.clone(), content.external_id.clone()))
            .cloned()
            .ok_or_else(|| VerificationError::ProofUnavailable {
                message: format!("{} {} not found", content.platform, content.external_id),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn youtube_ref() -> ExternalContentRef {
        ExternalContentRef {
            platform: "youtube".into(),
            external_id: "dQw4w9WgXcQ".into(),
        }
    }

    #[test]
    fn test_proof_line_round_trip() {
        let key = OwnerKey::from_bytes(&[0x11; 32]).unwrap();
        let proof = PlatformProof::create(ContentHash::of(b"video"), 1_700_000_000, &key).unwrap();
        let description = format!("My video\n\nSources below.\n{}\nThanks!", proof.to_line());

        let extracted = PlatformProof::extract(&description).unwrap();
        assert_eq!(extracted, proof);
        assert_eq!(extracted.recover_signer().unwrap(), key.address());
    }

    #[test]
    fn test_missing_and_malformed_proofs() {
        assert_eq!(
            PlatformProof::extract("just a description").unwrap_err(),
            VerificationError::ProofMissing
        );
        let hash = ContentHash::of(b"x");
        for bad in [
            "provenance-proof:v1:abc:1:0x00".to_string(),
            "provenance-proof:v1:".to_string(),
            format!("provenance-proof:v1:{hash}:soon:0x00"),
            format!("provenance-proof:v1:{hash}:1:0xzz"),
            format!("provenance-proof:v1:{hash}:1:0x00:extra"),
        ] {
            assert!(
                matches!(
                    PlatformProof::extract(&bad),
                    Err(VerificationError::MalformedProof { .. })
                ),
                "input {bad}"
            );
        }
    }

    #[test]
    fn test_auth_debug_redacted() {
        let endpoint = ProofEndpoint::youtube("AIza-secret-key");
        assert!(!format!("{endpoint:?}").contains("AIza-secret-key"));
    }

    #[tokio::test]
    async fn test_youtube_description_fetched_with_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/videos"))
            .and(query_param("id", "dQw4w9WgXcQ"))
            .and(query_param("key", "api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"snippet": {"description": "hello provenance"}}]
            })))
            .mount(&server)
            .await;

        let endpoint = ProofEndpoint::youtube("api-key").with_url_template(format!(
            "{}/youtube/v3/videos?part=snippet&id={{id}}",
            server.uri()
        ));
        let source = HttpProofSource::new(BackoffPolicy::immediate(2), Duration::from_secs(5))
            .unwrap()
            .with_endpoint("youtube", endpoint);

        let text = source
            .fetch_proof_text(&youtube_ref(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(text, "hello provenance");
    }

    #[tokio::test]
    async fn test_vimeo_bearer_and_missing_video() {
        let server = MockServer::start().await;
        Mock::given(path("/videos/404"))
            .and(header("authorization", "Bearer vimeo-token"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpProofSource::new(BackoffPolicy::immediate(3), Duration::from_secs(5))
            .unwrap()
            .with_endpoint(
                "vimeo",
                ProofEndpoint::vimeo("vimeo-token")
                    .with_url_template(format!("{}/videos/{{id}}", server.uri())),
            );
        let err = source
            .fetch_proof_text(
                &ExternalContentRef {
                    platform: "vimeo".into(),
                    external_id: "404".into(),
                },
                &CancelToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::ProofUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_transport_error_omits_api_key() {
        let endpoint = ProofEndpoint::youtube("AIza-secret-key")
            .with_url_template("http://127.0.0.1:1/youtube/v3/videos?part=snippet&id={id}");
        let source = HttpProofSource::new(BackoffPolicy::immediate(1), Duration::from_secs(1))
            .unwrap()
            .with_endpoint("youtube", endpoint);
        let err = source
            .fetch_proof_text(&youtube_ref(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::ProofUnavailable { .. }));
        assert!(!err.to_string().contains("AIza-secret-key"));
        assert!(!format!("{err:?}").contains("AIza-secret-key"));
    }

    #[tokio::test]
    async fn test_unconfigured_platform() {
        let source =
            HttpProofSource::new(BackoffPolicy::immediate(1), Duration::from_secs(1)).unwrap();
        let err = source
            .fetch_proof_text(&youtube_ref(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::ProofUnavailable { .. }));
    }
}
