//! Registry contract reached over Ethereum JSON-RPC.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use alloy::primitives::Bytes;
use alloy::rpc::types::TransactionReceipt;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::abi;
use super::{AnchoredRecord, RegistryContract, TxHash, TxReceipt};
use crate::error::RegistryError;
use crate::hash::ContentHash;
use crate::identity::Identity;
use crate::signature::Address;
use crate::upload::http::{is_transient_error, is_transient_status};

/// JSON-RPC code geth and most nodes use for `execution reverted`.
const EXECUTION_REVERTED: i64 = 3;

#[derive(Debug, Clone)]
pub struct EvmRegistryConfig {
    pub rpc_url: String,
    pub contract_address: Address,
    /// Node-managed account that sends anchoring transactions.
    pub account: Address,
    pub timeout: Duration,
}

pub struct EvmRegistryContract {
    client: Client,
    config: EvmRegistryConfig,
    account: String,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Value,
}

impl EvmRegistryContract {
    pub fn new(config: EvmRegistryConfig) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RegistryError::InvalidResponse(format!("failed to create HTTP client: {e}")))?;
        let account = config.account.to_string();
        Ok(Self {
            client,
            config,
            account,
            next_id: AtomicU64::new(1),
        })
    }

    #[instrument(skip(self, params), fields(rpc_method = method))]
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, RegistryError> {
        let start = Instant::now();
        let request_body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                let transient = is_transient_error(&e);
                let message = e.without_url().to_string();
                if transient {
                    RegistryError::RpcTransient(message)
                } else {
                    RegistryError::InvalidResponse(message)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Registry node returned HTTP error");
            return Err(if is_transient_status(status) {
                RegistryError::RpcTransient(format!("node returned status {status}"))
            } else {
                RegistryError::Rpc {
                    code: i64::from(status.as_u16()),
                    message: format!("node returned status {status}"),
                }
            });
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse(format!("malformed JSON-RPC response: {e}")))?;

        debug!(latency_ms = start.elapsed().as_millis() as u64, "RPC call completed");

        match body.error {
            Some(error) => Err(classify_rpc_error(error)),
            None => Ok(body.result),
        }
    }

    fn call_object(&self, data: &[u8]) -> Value {
        json!({
            "to": self.config.contract_address.to_string(),
            "data": Bytes::copy_from_slice(data),
        })
    }
}

fn classify_rpc_error(error: RpcErrorBody) -> RegistryError {
    let reverted = error.code == EXECUTION_REVERTED || error.message.contains("revert");
    if reverted {
        let reason = serde_json::from_value::<Bytes>(error.data)
            .ok()
            .and_then(|data| abi::decode_revert_reason(&data))
            .unwrap_or(error.message);
        return RegistryError::Reverted { reason };
    }
    if (-32099..=-32000).contains(&error.code) {
        return RegistryError::RpcTransient(format!("{} (code {})", error.message, error.code));
    }
    RegistryError::Rpc {
        code: error.code,
        message: error.message,
    }
}

fn decode_bytes_result(value: Value) -> Result<Bytes, RegistryError> {
    serde_json::from_value(value)
        .map_err(|e| RegistryError::InvalidResponse(format!("invalid hex result: {e}")))
}

#[async_trait]
impl RegistryContract for EvmRegistryContract {
    fn account(&self) -> &str {
        &self.account
    }

    async fn resolve(&self, hash: &ContentHash) -> Result<Option<AnchoredRecord>, RegistryError> {
        let call = self.call_object(&abi::encode_resolve(hash.as_bytes()));
        let result = self.rpc_call("eth_call", json!([call, "latest"])).await?;
        let data = decode_bytes_result(result)?;
        let Some((identity, anchored_at)) = abi::decode_resolve(&data)? else {
            return Ok(None);
        };
        let secs = i64::try_from(anchored_at)
            .map_err(|_| RegistryError::InvalidResponse("anchoredAt out of range".into()))?;
        let anchored_at = Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| RegistryError::InvalidResponse("anchoredAt out of range".into()))?;
        Ok(Some(AnchoredRecord {
            identity,
            anchored_at,
        }))
    }

    async fn submit_anchor(
        &self,
        hash: &ContentHash,
        identity: &Identity,
    ) -> Result<TxHash, RegistryError> {
        let mut tx = self.call_object(&abi::encode_anchor(hash.as_bytes(), identity.as_str()));
        tx["from"] = Value::String(self.account.clone());
        let result = self.rpc_call("eth_sendTransaction", json!([tx])).await?;
        result
            .as_str()
            .map(TxHash::new)
            .ok_or_else(|| RegistryError::InvalidResponse("expected transaction hash".into()))
    }

    async fn receipt(&self, tx: &TxHash) -> Result<Option<TxReceipt>, RegistryError> {
        let result = self
            .rpc_call("eth_getTransactionReceipt", json!([tx.as_str()]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let receipt: TransactionReceipt = serde_json::from_value(result)
            .map_err(|e| RegistryError::InvalidResponse(format!("malformed receipt: {e}")))?;
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };
        Ok(Some(TxReceipt {
            tx_hash: tx.clone(),
            success: receipt.status(),
            block_number,
        }))
    }
}
