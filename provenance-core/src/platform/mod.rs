//! Platform bindings and proof verification.
//!
//! A binding claims that a piece of platform content (a YouTube or Vimeo
//! video) carries a proof signed by the identity named in a manifest. The
//! [`PlatformVerifier`] checks that claim and records the outcome.

pub mod proof;
pub mod verifier;
pub mod vimeo;
pub mod youtube;

pub use proof::{
    HttpProofSource, PlatformProof, ProofAuth, ProofEndpoint, ProofSource, StaticProofSource,
};
pub use verifier::{PlatformVerifier, VerifierConfig};
pub use vimeo::VimeoMatcher;
pub use youtube::YouTubeMatcher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{ParseError, VerificationError};
use crate::signature::Address;

/// Recognizes one platform's URL shapes.
pub trait PlatformMatcher: Send + Sync {
    fn platform(&self) -> &'static str;

    /// External content id if `url` points at this platform's content.
    fn match_url(&self, url: &Url) -> Option<String>;
}

/// Content on an external platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalContentRef {
    pub platform: String,
    pub external_id: String,
}

pub struct PlatformRegistry {
    matchers: Vec<Box<dyn PlatformMatcher>>,
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PlatformRegistry {
    pub fn empty() -> Self {
        Self {
            matchers: Vec::new(),
        }
    }

    /// YouTube and Vimeo.
    pub fn with_defaults() -> Self {
        Self::empty()
            .with_matcher(Box::new(YouTubeMatcher))
            .with_matcher(Box::new(VimeoMatcher))
    }

    pub fn with_matcher(mut self, matcher: Box<dyn PlatformMatcher>) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn platforms(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|m| m.platform()).collect()
    }

    /// Identify the platform and content id behind `input`. A missing scheme
    /// is read as `https://`.
    pub fn parse(&self, input: &str) -> Result<ExternalContentRef, ParseError> {
        let trimmed = input.trim();
        let error = |reason: String| ParseError {
            url: trimmed.to_string(),
            reason,
        };

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };
        let url = Url::parse(&candidate).map_err(|e| error(format!("not a URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(error(format!("unsupported scheme `{}`", url.scheme())));
        }

        self.matchers
            .iter()
            .find_map(|matcher| {
                matcher.match_url(&url).map(|external_id| ExternalContentRef {
                    platform: matcher.platform().to_string(),
                    external_id,
                })
            })
            .ok_or_else(|| error("no registered platform recognizes this URL".to_string()))
    }
}

/// Claim that platform content was published by a manifest's identity.
///
/// Unique per (platform, external id); a resubmission supersedes the previous
/// binding instead of mutating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformBinding {
    pub id: Uuid,
    pub platform: String,
    pub external_id: String,
    pub proof_url: String,
    pub manifest_uri: String,
    pub submitted_at: DateTime<Utc>,
}

impl PlatformBinding {
    pub fn new(content: ExternalContentRef, proof_url: &str, manifest_uri: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            platform: content.platform,
            external_id: content.external_id,
            proof_url: proof_url.to_string(),
            manifest_uri: manifest_uri.to_string(),
            submitted_at: Utc::now(),
        }
    }

    pub fn content_ref(&self) -> ExternalContentRef {
        ExternalContentRef {
            platform: self.platform.clone(),
            external_id: self.external_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified,
    Failed { reason: VerificationError },
}

/// Result of one verification attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: Uuid,
    pub binding_id: Uuid,
    pub platform: String,
    pub external_id: String,
    pub outcome: VerificationOutcome,
    pub recovered_signer: Option<Address>,
    pub checked_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn is_verified(&self) -> bool {
        matches!(self.outcome, VerificationOutcome::Verified)
    }

    pub fn failure(&self) -> Option<&VerificationError> {
        match &self.outcome {
            VerificationOutcome::Verified => None,
            VerificationOutcome::Failed { reason } => Some(reason),
        }
    }
}
