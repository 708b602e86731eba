//! Call encoding for the registry contract.

use alloy::primitives::{FixedBytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::error::RegistryError;

sol! {
    function anchor(bytes32 contentHash, string identity) external;
    function resolve(bytes32 contentHash) external view returns (string identity, uint256 anchoredAt);
}

pub fn encode_anchor(content_hash: &[u8; 32], identity: &str) -> Vec<u8> {
    anchorCall {
        contentHash: FixedBytes::from(*content_hash),
        identity: identity.to_string(),
    }
    .abi_encode()
}

pub fn encode_resolve(content_hash: &[u8; 32]) -> Vec<u8> {
    resolveCall {
        contentHash: FixedBytes::from(*content_hash),
    }
    .abi_encode()
}

/// Decode `(string identity, uint256 anchoredAt)`. An empty identity means
/// the hash was never anchored.
pub fn decode_resolve(data: &[u8]) -> Result<Option<(String, u64)>, RegistryError> {
    let decoded = resolveCall::abi_decode_returns(data, true)
        .map_err(|e| RegistryError::InvalidResponse(format!("invalid resolve result: {e}")))?;
    if decoded.identity.is_empty() {
        return Ok(None);
    }
    let anchored_at = u64::try_from(decoded.anchoredAt)
        .map_err(|_| RegistryError::InvalidResponse("anchoredAt exceeds 64 bits".into()))?;
    Ok(Some((decoded.identity, anchored_at)))
}

/// Human-readable reason from revert data (`Error(string)`, `Panic(uint256)`).
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    alloy::sol_types::decode_revert_reason(data)
}

/// Encode a `resolve` return value, as a node would return it.
pub fn encode_resolve_result(identity: &str, anchored_at: u64) -> Vec<u8> {
    resolveCall::abi_encode_returns(&(identity.to_string(), U256::from(anchored_at)))
}
