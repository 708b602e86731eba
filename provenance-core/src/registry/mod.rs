//! On-chain registry client.
//!
//! The registry maps a content hash to the identity that anchored it. The
//! [`RegistryClient`] makes anchoring idempotent: a hash that already has an
//! entry is reported as [`AnchorOutcome::AlreadyAnchored`] without sending a
//! transaction, writes from the same account are queued behind one async
//! mutex, and a transaction that was submitted but not yet confirmed is
//! polled again instead of being resubmitted. A transaction that stays
//! unconfirmed for `max_confirmation_rounds` consecutive waits is presumed
//! dropped and forgotten, so the next call submits afresh.

pub mod abi;
pub mod evm;
pub mod memory;

pub use evm::{EvmRegistryConfig, EvmRegistryContract};
pub use memory::MemoryLedger;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::cancel::{CancelToken, Interrupted};
use crate::error::RegistryError;
use crate::hash::ContentHash;
use crate::identity::Identity;
use crate::retry::{retry, Attempt, BackoffPolicy, RetryFailure};

/// Transaction hash as reported by the ledger (`0x`-prefixed hex).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.0)
    }
}

/// What the contract stores for an anchored hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchoredRecord {
    pub identity: String,
    pub anchored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub block_number: u64,
}

/// One registry entry per content hash. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub content_hash: ContentHash,
    pub identity: String,
    /// Known only when this client submitted the anchoring transaction.
    pub tx_hash: Option<TxHash>,
    pub anchored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorOutcome {
    Anchored(RegistryEntry),
    /// The hash was anchored earlier; no transaction was sent.
    AlreadyAnchored(RegistryEntry),
}

impl AnchorOutcome {
    pub fn entry(&self) -> &RegistryEntry {
        match self {
            Self::Anchored(entry) | Self::AlreadyAnchored(entry) => entry,
        }
    }

    pub fn into_entry(self) -> RegistryEntry {
        match self {
            Self::Anchored(entry) | Self::AlreadyAnchored(entry) => entry,
        }
    }
}

/// Call interface of the registry contract.
#[async_trait]
pub trait RegistryContract: Send + Sync {
    /// Account that signs anchoring transactions.
    fn account(&self) -> &str;

    async fn resolve(&self, hash: &ContentHash) -> Result<Option<AnchoredRecord>, RegistryError>;

    async fn submit_anchor(
        &self,
        hash: &ContentHash,
        identity: &Identity,
    ) -> Result<TxHash, RegistryError>;

    /// `None` while the transaction is not yet mined.
    async fn receipt(&self, tx: &TxHash) -> Result<Option<TxReceipt>, RegistryError>;
}

#[derive(Debug, Clone)]
pub struct RegistryClientConfig {
    pub policy: BackoffPolicy,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
    /// Bound on each read call.
    pub call_timeout: Duration,
    /// Confirmation waits that may time out before a pending transaction
    /// is abandoned.
    pub max_confirmation_rounds: u32,
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            policy: BackoffPolicy::default(),
            poll_interval: Duration::from_secs(2),
            confirmation_timeout: Duration::from_secs(120),
            call_timeout: Duration::from_secs(15),
            max_confirmation_rounds: 3,
        }
    }
}

pub struct RegistryClient {
    contract: Arc<dyn RegistryContract>,
    config: RegistryClientConfig,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
    pending: DashMap<ContentHash, PendingTx>,
    submitted: DashMap<ContentHash, TxHash>,
}

#[derive(Debug, Clone)]
struct PendingTx {
    tx: TxHash,
    timed_out_rounds: u32,
}

fn classify(error: RegistryError) -> Attempt<RegistryError> {
    if error.is_transient() {
        Attempt::Transient(error)
    } else {
        Attempt::Permanent(error)
    }
}

fn unwrap_retry<T>(result: Result<(T, u32), RetryFailure<RegistryError>>) -> Result<T, RegistryError> {
    match result {
        Ok((value, _)) => Ok(value),
        Err(RetryFailure::Permanent { error, .. }) | Err(RetryFailure::Exhausted { error, .. }) => {
            Err(error)
        }
        Err(RetryFailure::Cancelled { reason, .. }) => Err(RegistryError::Cancelled(reason)),
    }
}

impl RegistryClient {
    pub fn new(contract: Arc<dyn RegistryContract>, config: RegistryClientConfig) -> Self {
        Self {
            contract,
            config,
            write_locks: DashMap::new(),
            pending: DashMap::new(),
            submitted: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RegistryClientConfig {
        &self.config
    }

    /// Transaction submitted for `hash` that has not been confirmed yet.
    pub fn pending_transaction(&self, hash: &ContentHash) -> Option<TxHash> {
        self.pending.get(hash).map(|pending| pending.tx.clone())
    }

    fn account_lock(&self) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(self.contract.account().to_string())
            .or_default()
            .clone()
    }

    /// Look up the registry entry for `hash`. A missing entry is `Ok(None)`.
    #[instrument(skip(self, cancel), fields(hash = %hash))]
    pub async fn resolve(
        &self,
        hash: &ContentHash,
        cancel: &CancelToken,
    ) -> Result<Option<RegistryEntry>, RegistryError> {
        let record = self.read_record(hash, cancel).await?;
        Ok(record.map(|record| self.entry_from(hash, record)))
    }

    async fn read_record(
        &self,
        hash: &ContentHash,
        cancel: &CancelToken,
    ) -> Result<Option<AnchoredRecord>, RegistryError> {
        let contract = self.contract.as_ref();
        let limit = self.config.call_timeout;
        let result = retry(&self.config.policy, cancel, "registry_resolve", |_| async move {
            match cancel.run_bounded(limit, contract.resolve(hash)).await {
                Ok(result) => result.map_err(classify),
                Err(Interrupted::TimedOut(limit)) => Err(Attempt::Transient(
                    RegistryError::RpcTransient(format!("resolve timed out after {}ms", limit.as_millis())),
                )),
                Err(Interrupted::Cancelled(reason)) => {
                    Err(Attempt::Permanent(RegistryError::Cancelled(reason)))
                }
            }
        })
        .await;
        unwrap_retry(result)
    }

    fn entry_from(&self, hash: &ContentHash, record: AnchoredRecord) -> RegistryEntry {
        RegistryEntry {
            content_hash: *hash,
            identity: record.identity,
            tx_hash: self.submitted.get(hash).map(|tx| tx.clone()),
            anchored_at: record.anchored_at,
        }
    }

    /// Anchor `hash` to `identity`, at most once.
    #[instrument(skip(self, cancel), fields(hash = %hash, identity = %identity))]
    pub async fn anchor(
        &self,
        hash: &ContentHash,
        identity: &Identity,
        cancel: &CancelToken,
    ) -> Result<AnchorOutcome, RegistryError> {
        cancel.check()?;
        let lock = self.account_lock();
        let _guard = lock.lock().await;
        cancel.check()?;

        if let Some(tx) = self.pending_transaction(hash) {
            if let Some(record) = self.read_record(hash, cancel).await? {
                self.pending.remove(hash);
                info!(tx_hash = %tx, "Pending anchor already recorded");
                return Ok(AnchorOutcome::Anchored(self.entry_from(hash, record)));
            }
            info!(tx_hash = %tx, "Awaiting previously submitted transaction");
            return self
                .confirm(hash, identity, tx, cancel)
                .await
                .map(AnchorOutcome::Anchored);
        }

        if let Some(record) = self.read_record(hash, cancel).await? {
            info!(anchored_by = %record.identity, "Content hash already anchored");
            return Ok(AnchorOutcome::AlreadyAnchored(self.entry_from(hash, record)));
        }

        let contract = self.contract.as_ref();
        let submitted = retry(&self.config.policy, cancel, "registry_anchor", |attempt| async move {
            // A failed submission may still have landed; never resubmit blindly.
            if attempt > 1 {
                match contract.resolve(hash).await {
                    Ok(Some(record)) => return Ok(Err(record)),
                    Ok(None) => {}
                    Err(e) => return Err(classify(e)),
                }
            }
            contract.submit_anchor(hash, identity).await.map(Ok).map_err(classify)
        })
        .await;

        let tx = match unwrap_retry(submitted)? {
            Ok(tx) => tx,
            Err(record) => {
                info!("Anchor landed during retry");
                return Ok(AnchorOutcome::AlreadyAnchored(self.entry_from(hash, record)));
            }
        };

        info!(tx_hash = %tx, "Anchor transaction submitted");
        self.pending.insert(
            *hash,
            PendingTx {
                tx: tx.clone(),
                timed_out_rounds: 0,
            },
        );
        self.submitted.insert(*hash, tx.clone());

        self.confirm(hash, identity, tx, cancel)
            .await
            .map(AnchorOutcome::Anchored)
    }

    /// Wait for `tx` to be mined, then read back the entry.
    async fn confirm(
        &self,
        hash: &ContentHash,
        identity: &Identity,
        tx: TxHash,
        cancel: &CancelToken,
    ) -> Result<RegistryEntry, RegistryError> {
        let receipt = self.await_receipt(&tx, cancel).await;
        match receipt {
            Ok(receipt) if receipt.success => {
                self.pending.remove(hash);
                debug!(tx_hash = %tx, block = receipt.block_number, "Anchor confirmed");
            }
            Ok(_) => {
                self.pending.remove(hash);
                self.submitted.remove(hash);
                warn!(tx_hash = %tx, "Anchor transaction reverted");
                return Err(RegistryError::Reverted {
                    reason: format!("transaction {tx} reverted"),
                });
            }
            Err(e @ RegistryError::ConfirmationTimeout { .. }) => {
                self.record_timeout(hash, &tx);
                return Err(e);
            }
            // Cancellation and poll failures keep the transaction pending.
            Err(e) => return Err(e),
        }

        let entry = match self.read_record(hash, cancel).await? {
            Some(record) => self.entry_from(hash, record),
            None => {
                warn!(tx_hash = %tx, "Confirmed anchor not yet visible, using local time");
                RegistryEntry {
                    content_hash: *hash,
                    identity: identity.to_string(),
                    tx_hash: Some(tx),
                    anchored_at: Utc::now(),
                }
            }
        };
        Ok(entry)
    }

    fn record_timeout(&self, hash: &ContentHash, tx: &TxHash) {
        let rounds = match self.pending.get_mut(hash) {
            Some(mut pending) if pending.tx == *tx => {
                pending.timed_out_rounds += 1;
                pending.timed_out_rounds
            }
            _ => return,
        };
        if rounds >= self.config.max_confirmation_rounds {
            self.pending.remove(hash);
            self.submitted.remove(hash);
            warn!(tx_hash = %tx, rounds, "Abandoning unconfirmed transaction");
        }
    }

    async fn await_receipt(&self, tx: &TxHash, cancel: &CancelToken) -> Result<TxReceipt, RegistryError> {
        let deadline = Instant::now() + self.config.confirmation_timeout;
        loop {
            cancel.check()?;
            match self.contract.receipt(tx).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => debug!(tx_hash = %tx, "Transaction not yet mined"),
                Err(e) if e.is_transient() => {
                    warn!(tx_hash = %tx, error = %e, "Receipt poll failed, will retry")
                }
                Err(e) => return Err(e),
            }

            if Instant::now() + self.config.poll_interval > deadline {
                return Err(RegistryError::ConfirmationTimeout {
                    tx_hash: tx.to_string(),
                });
            }
            cancel.sleep(self.config.poll_interval).await?;
        }
    }
}
