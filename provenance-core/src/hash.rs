//! Deterministic content hashing.
//!
//! Content hashes are SHA3-256 digests rendered as 64 lowercase hex
//! characters. Keccak-256 is exposed separately for ledger-facing encodings
//! (function selectors, EIP-191 digests, addresses).

use std::fmt;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256, Sha3_256};

use crate::error::CryptoError;

/// Length of a hex-encoded content hash.
pub const CONTENT_HASH_HEX_LEN: usize = 64;

/// SHA3-256 hash of raw content bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash raw bytes. A pure function of its input.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hash from exactly 64 hex characters (an optional `0x` prefix is accepted).
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != CONTENT_HASH_HEX_LEN {
            return Err(CryptoError::InvalidHash(format!(
                "expected {CONTENT_HASH_HEX_LEN} hex characters, got {}",
                digits.len()
            )));
        }
        let bytes = hex::decode(digits).map_err(|e| CryptoError::InvalidHash(e.to_string()))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({}…)", &self.to_hex()[..12])
    }
}

impl TryFrom<String> for ContentHash {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

/// Returns true when `s` is exactly 64 lowercase hex characters.
pub fn is_canonical_hex_hash(s: &str) -> bool {
    s.len() == CONTENT_HASH_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Keccak-256 digest (the pre-standard SHA3 variant used by EVM ledgers).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Short, non-reversible fingerprint used to refer to sensitive values in logs.
pub fn fingerprint(data: &[u8]) -> String {
    let digest = Sha3_256::digest(data);
    hex::encode(&digest[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let content = b"Hello World";
        let first = ContentHash::of(content);
        for _ in 0..10 {
            assert_eq!(ContentHash::of(content), first);
        }
    }

    #[test]
    fn test_hash_known_vector() {
        // SHA3-256("abc")
        let hash = ContentHash::of(b"abc");
        assert_eq!(
            hash.to_hex(),
            "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532"
        );
    }

    #[test]
    fn test_different_content_different_hash() {
        assert_ne!(ContentHash::of(b"Content A"), ContentHash::of(b"Content B"));
    }

    #[test]
    fn test_hex_parsing() {
        let hash = ContentHash::of(b"abc");
        assert_eq!(ContentHash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert_eq!(
            ContentHash::from_hex(&format!("0x{}", hash.to_hex())).unwrap(),
            hash
        );
        assert!(ContentHash::from_hex("abcd").is_err());
        assert!(ContentHash::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_canonical_hex_pattern() {
        let hash = ContentHash::of(b"abc").to_hex();
        assert!(is_canonical_hex_hash(&hash));
        assert!(!is_canonical_hex_hash(&hash.to_uppercase()));
        assert!(!is_canonical_hex_hash(&hash[..63]));
        assert!(!is_canonical_hex_hash(&format!("0x{}", &hash[..62])));
    }

    #[test]
    fn test_keccak_selector_vector() {
        // Well-known ERC-20 transfer selector.
        let digest = keccak256(b"transfer(address,uint256)");
        assert_eq!(hex::encode(&digest[..4]), "a9059cbb");
    }

    #[test]
    fn test_serde_as_hex_string() {
        let hash = ContentHash::of(b"abc");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
