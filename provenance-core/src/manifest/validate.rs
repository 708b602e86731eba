//! Field-by-field validation of fetched manifest documents.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{truncate_to_seconds, Manifest, ManifestSignature, MANIFEST_VERSION};
use crate::cid::Cid;
use crate::error::ManifestValidationError;
use crate::hash::{is_canonical_hex_hash, ContentHash};
use crate::identity::Identity;
use crate::signature::Address;

/// The document as fetched, before any field is trusted.
#[derive(Debug, Deserialize)]
struct RawManifest {
    version: Option<Value>,
    content_hash: Option<Value>,
    cid: Option<Value>,
    identity: Option<Value>,
    created_at: Option<Value>,
    signature: Option<Value>,
    signer: Option<Value>,
}

fn required<'a>(value: &'a Option<Value>, field: &str) -> Result<&'a Value, ManifestValidationError> {
    match value {
        Some(Value::Null) | None => Err(ManifestValidationError::new(field, "missing")),
        Some(v) => Ok(v),
    }
}

fn required_str<'a>(value: &'a Option<Value>, field: &str) -> Result<&'a str, ManifestValidationError> {
    required(value, field)?
        .as_str()
        .ok_or_else(|| ManifestValidationError::new(field, "must be a string"))
}

/// Parse and validate a manifest document fetched at `now`.
///
/// `created_at` may lie at most `clock_skew` in the future; fractional
/// seconds are accepted and dropped, since the canonical form carries whole
/// seconds only. Every failure
/// names the offending field; a body that is not a JSON object is reported
/// against `document`.
pub fn parse_manifest(
    body: &[u8],
    now: DateTime<Utc>,
    clock_skew: Duration,
) -> Result<Manifest, ManifestValidationError> {
    let document: Value = serde_json::from_slice(body)
        .map_err(|e| ManifestValidationError::new("document", format!("not valid JSON: {e}")))?;
    if !document.is_object() {
        return Err(ManifestValidationError::new("document", "must be a JSON object"));
    }
    let raw = RawManifest::deserialize(document)
        .map_err(|e| ManifestValidationError::new("document", e.to_string()))?;

    let version = required(&raw.version, "version")?
        .as_u64()
        .ok_or_else(|| ManifestValidationError::new("version", "must be a positive integer"))?;
    if version != u64::from(MANIFEST_VERSION) {
        return Err(ManifestValidationError::new(
            "version",
            format!("unsupported version {version}"),
        ));
    }

    let hash_hex = required_str(&raw.content_hash, "content_hash")?;
    if !is_canonical_hex_hash(hash_hex) {
        return Err(ManifestValidationError::new(
            "content_hash",
            "must be 64 lowercase hex characters",
        ));
    }
    let content_hash = ContentHash::from_hex(hash_hex)
        .map_err(|e| ManifestValidationError::new("content_hash", e.to_string()))?;

    let cid = Cid::parse(required_str(&raw.cid, "cid")?)?;
    let identity = Identity::parse(required_str(&raw.identity, "identity")?)?;

    let created_raw = required_str(&raw.created_at, "created_at")?;
    let created_at = DateTime::parse_from_rfc3339(created_raw)
        .map_err(|e| ManifestValidationError::new("created_at", format!("not RFC 3339: {e}")))?
        .with_timezone(&Utc);
    if created_at > now + clock_skew {
        return Err(ManifestValidationError::new(
            "created_at",
            format!("{created_raw} is in the future"),
        ));
    }

    let signature = match (&raw.signature, &raw.signer) {
        (None | Some(Value::Null), None | Some(Value::Null)) => None,
        (Some(_), Some(_)) => {
            let value = required_str(&raw.signature, "signature")?.to_string();
            let signer: Address = required_str(&raw.signer, "signer")?
                .parse()
                .map_err(|e: crate::error::CryptoError| {
                    ManifestValidationError::new("signer", e.to_string())
                })?;
            Some(ManifestSignature { value, signer })
        }
        _ => {
            return Err(ManifestValidationError::new(
                "signature",
                "signature and signer must be present together",
            ))
        }
    };

    let manifest = Manifest {
        version: MANIFEST_VERSION,
        content_hash,
        cid,
        identity,
        created_at: truncate_to_seconds(created_at),
        signature,
    };
    manifest.verify_signature()?;
    Ok(manifest)
}
