//! Provenance manifests.
//!
//! A manifest binds a content hash, the CID the content was stored under and
//! the publishing identity at a point in time. Its canonical form is a compact
//! JSON object with keys in a fixed order:
//!
//! ```text
//! {"version":1,"content_hash":"…","cid":"…","identity":"…","created_at":"…Z"}
//! ```
//!
//! The manifest hash is SHA3-256 of those bytes. An optional owner signature
//! (EIP-191 over the canonical bytes) travels alongside the payload but is
//! never part of what is hashed.

pub mod cache;
pub mod resolver;
pub mod validate;

pub use cache::{CacheLookup, ManifestCache};
pub use resolver::{ManifestResolver, ManifestSource, ResolverConfig};
pub use validate::parse_manifest;

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::cid::Cid;
use crate::error::{CryptoError, ManifestValidationError, ProvenanceError};
use crate::hash::ContentHash;
use crate::identity::Identity;
use crate::signature::{decode_signature_hex, encode_signature_hex, recover_signer, Address, OwnerKey};

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Owner signature attached to a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSignature {
    #[serde(rename = "signature")]
    pub value: String,
    pub signer: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub version: u32,
    pub content_hash: ContentHash,
    pub cid: Cid,
    pub identity: Identity,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub signature: Option<ManifestSignature>,
}

impl Manifest {
    /// Canonical bytes covered by the manifest hash and the owner signature.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        format!(
            "{{\"version\":{},\"content_hash\":{},\"cid\":{},\"identity\":{},\"created_at\":{}}}",
            self.version,
            json_string(&self.content_hash.to_hex()),
            json_string(self.cid.as_str()),
            json_string(self.identity.as_str()),
            json_string(&format_timestamp(&self.created_at)),
        )
        .into_bytes()
    }

    pub fn manifest_hash(&self) -> ContentHash {
        ContentHash::of(&self.canonical_bytes())
    }

    /// Attach an owner signature over the canonical bytes.
    pub fn sign(mut self, key: &OwnerKey) -> Result<Self, CryptoError> {
        let signature = key.sign_message(&self.canonical_bytes())?;
        self.signature = Some(ManifestSignature {
            value: encode_signature_hex(&signature),
            signer: key.address(),
        });
        Ok(self)
    }

    /// Check the attached signature, if any, against its declared signer.
    ///
    /// Returns the recovered signer, or `None` for unsigned manifests.
    pub fn verify_signature(&self) -> Result<Option<Address>, ManifestValidationError> {
        let Some(sig) = &self.signature else {
            return Ok(None);
        };
        let bytes = decode_signature_hex(&sig.value)
            .map_err(|e| ManifestValidationError::new("signature", e.to_string()))?;
        let recovered = recover_signer(&self.canonical_bytes(), &bytes)
            .map_err(|e| ManifestValidationError::new("signature", e.to_string()))?;
        if recovered != sig.signer {
            return Err(ManifestValidationError::new(
                "signature",
                format!("recovers to {recovered}, manifest names {}", sig.signer),
            ));
        }
        Ok(Some(recovered))
    }

    /// Recompute the hash of `content` and compare it with the manifest.
    pub fn verify_content(&self, content: &[u8]) -> Result<(), ManifestValidationError> {
        let actual = ContentHash::of(content);
        if actual != self.content_hash {
            return Err(ManifestValidationError::new(
                "content_hash",
                format!("manifest records {}, content hashes to {actual}", self.content_hash),
            ));
        }
        Ok(())
    }

    /// Full document, signature included, as pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, ProvenanceError> {
        serde_json::to_string_pretty(self).map_err(|e| ProvenanceError::Serialization(e.to_string()))
    }

    /// Full document as compact JSON, for publishing.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, ProvenanceError> {
        serde_json::to_vec(self).map_err(|e| ProvenanceError::Serialization(e.to_string()))
    }
}

pub struct ManifestBuilder {
    cid: Cid,
    content_hash: ContentHash,
    identity: Identity,
    created_at: Option<DateTime<Utc>>,
}

impl ManifestBuilder {
    pub fn new(cid: Cid, content_hash: ContentHash, identity: Identity) -> Self {
        Self {
            cid,
            content_hash,
            identity,
            created_at: None,
        }
    }

    /// Override the creation time (defaults to now). Truncated to seconds.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn build(self) -> Manifest {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        Manifest {
            version: MANIFEST_VERSION,
            content_hash: self.content_hash,
            cid: self.cid,
            identity: self.identity,
            created_at: truncate_to_seconds(created_at),
            signature: None,
        }
    }
}

pub(crate) fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn serialize_timestamp<S: serde::Serializer>(
    ts: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}

fn json_string(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}
