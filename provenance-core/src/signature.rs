//! secp256k1 signing and signer recovery over EIP-191 personal messages.
//!
//! Signatures are 65 bytes, `r || s || v`, with `v` in `{27, 28}` when
//! produced here. Recovery also accepts `v` in `{0, 1}`.

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::hash::keccak256;

/// Length of a recoverable signature in bytes.
pub const SIGNATURE_LEN: usize = 65;

/// 20-byte account address derived from a secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Address of a public key: the last 20 bytes of Keccak-256 over the
    /// uncompressed point without its `0x04` tag.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let digest = keccak256(&point.as_bytes()[1..]);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Self(out)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| CryptoError::InvalidAddress(format!("missing 0x prefix: {s}")))?;
        if digits.len() != 40 {
            return Err(CryptoError::InvalidAddress(format!(
                "expected 40 hex characters, got {}",
                digits.len()
            )));
        }
        let bytes = hex::decode(digits).map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl TryFrom<String> for Address {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

/// A content owner's signing key. Key material is zeroized on drop.
pub struct OwnerKey {
    key: SigningKey,
}

impl OwnerKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key = SigningKey::from_slice(bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Parse a hex-encoded 32-byte secret key, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = Zeroizing::new(
            hex::decode(digits).map_err(|e| CryptoError::InvalidKey(format!("invalid hex: {e}")))?,
        );
        Self::from_bytes(&bytes)
    }

    pub fn address(&self) -> Address {
        Address::from_verifying_key(self.key.verifying_key())
    }

    /// Sign `message` as an EIP-191 personal message.
    pub fn sign_message(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], CryptoError> {
        let digest = eip191_hash(message);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = 27 + recovery_id.to_byte();
        Ok(out)
    }
}

impl fmt::Debug for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerKey")
            .field("address", &self.address())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Digest of `"\x19Ethereum Signed Message:\n" || len || message`.
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let mut prefixed = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    prefixed.extend_from_slice(message);
    keccak256(&prefixed)
}

/// Recover the address that produced `signature` over `message`.
pub fn recover_signer(message: &[u8], signature: &[u8]) -> Result<Address, CryptoError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(CryptoError::InvalidSignature(format!(
            "expected {SIGNATURE_LEN} bytes, got {}",
            signature.len()
        )));
    }

    let v = match signature[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        other => {
            return Err(CryptoError::InvalidSignature(format!(
                "invalid recovery byte {other}"
            )))
        }
    };
    let mut recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| CryptoError::InvalidSignature(format!("invalid recovery id {v}")))?;

    let mut sig = Signature::from_slice(&signature[..64])
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    // High-s signatures are rejected by the verifier; flip to the low-s twin.
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let key = VerifyingKey::recover_from_prehash(&eip191_hash(message), &sig, recovery_id)
        .map_err(|e| CryptoError::InvalidSignature(format!("recovery failed: {e}")))?;
    Ok(Address::from_verifying_key(&key))
}

/// Decode a `0x`-prefixed (or bare) hex signature.
pub fn decode_signature_hex(s: &str) -> Result<Vec<u8>, CryptoError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    if bytes.len() != SIGNATURE_LEN {
        return Err(CryptoError::InvalidSignature(format!(
            "expected {SIGNATURE_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

pub fn encode_signature_hex(signature: &[u8]) -> String {
    format!("0x{}", hex::encode(signature))
}
