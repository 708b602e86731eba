//! In-process registry contract for tests and offline runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::{AnchoredRecord, RegistryContract, TxHash, TxReceipt};
use crate::error::RegistryError;
use crate::hash::{keccak256, ContentHash};
use crate::identity::Identity;

#[derive(Debug, Clone)]
struct LedgerTx {
    hash: ContentHash,
    identity: String,
    block: Option<u64>,
    success: bool,
}

/// Ledger that mines transactions instantly unless confirmations are held.
///
/// Submitting an anchor for a hash that already has a record reverts, like
/// the deployed contract does.
pub struct MemoryLedger {
    account: String,
    records: DashMap<ContentHash, AnchoredRecord>,
    transactions: DashMap<TxHash, LedgerTx>,
    submit_failures: Mutex<VecDeque<RegistryError>>,
    hold: AtomicBool,
    next_block: AtomicU64,
    resolve_calls: AtomicU32,
    submit_calls: AtomicU32,
}

impl MemoryLedger {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            records: DashMap::new(),
            transactions: DashMap::new(),
            submit_failures: Mutex::new(VecDeque::new()),
            hold: AtomicBool::new(false),
            next_block: AtomicU64::new(1),
            resolve_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
        }
    }

    /// Queue errors returned, in order, by the next `submit_anchor` calls.
    pub fn fail_next_submits(self, errors: impl IntoIterator<Item = RegistryError>) -> Self {
        if let Ok(mut queue) = self.submit_failures.lock() {
            queue.extend(errors);
        }
        self
    }

    /// While held, submitted transactions stay unmined.
    pub fn hold_confirmations(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    /// Mine every held transaction and stop holding.
    pub fn release_pending(&self) {
        self.hold.store(false, Ordering::SeqCst);
        for mut tx in self.transactions.iter_mut() {
            if tx.block.is_none() {
                let block = self.next_block.fetch_add(1, Ordering::SeqCst);
                self.mine(&mut tx, block);
            }
        }
    }

    fn mine(&self, tx: &mut LedgerTx, block: u64) {
        tx.block = Some(block);
        if self.records.contains_key(&tx.hash) {
            tx.success = false;
            return;
        }
        tx.success = true;
        self.records.insert(
            tx.hash,
            AnchoredRecord {
                identity: tx.identity.clone(),
                anchored_at: Utc::now(),
            },
        );
    }

    pub fn resolve_calls(&self) -> u32 {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn record(&self, hash: &ContentHash) -> Option<AnchoredRecord> {
        self.records.get(hash).map(|r| r.clone())
    }
}

#[async_trait]
impl RegistryContract for MemoryLedger {
    fn account(&self) -> &str {
        &self.account
    }

    async fn resolve(&self, hash: &ContentHash) -> Result<Option<AnchoredRecord>, RegistryError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.record(hash))
    }

    async fn submit_anchor(
        &self,
        hash: &ContentHash,
        identity: &Identity,
    ) -> Result<TxHash, RegistryError> {
        let nonce = self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .submit_failures
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        if let Some(error) = scripted {
            return Err(error);
        }
        if self.records.contains_key(hash) {
            return Err(RegistryError::Reverted {
                reason: "content hash already anchored".to_string(),
            });
        }

        let mut preimage = hash.as_bytes().to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let tx_hash = TxHash::new(format!("0x{}", hex::encode(keccak256(&preimage))));

        let mut tx = LedgerTx {
            hash: *hash,
            identity: identity.to_string(),
            block: None,
            success: false,
        };
        if !self.hold.load(Ordering::SeqCst) {
            let block = self.next_block.fetch_add(1, Ordering::SeqCst);
            self.mine(&mut tx, block);
        }
        self.transactions.insert(tx_hash.clone(), tx);
        Ok(tx_hash)
    }

    async fn receipt(&self, tx: &TxHash) -> Result<Option<TxReceipt>, RegistryError> {
        let Some(entry) = self.transactions.get(tx) else {
            return Err(RegistryError::InvalidResponse(format!("unknown transaction {tx}")));
        };
        Ok(entry.block.map(|block_number| TxReceipt {
            tx_hash: tx.clone(),
            success: entry.success,
            block_number,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::parse("did:web:example.com").unwrap()
    }

    #[tokio::test]
    async fn test_submit_mines_immediately() {
        let ledger = MemoryLedger::new("0xaccount");
        let hash = ContentHash::of(b"a");
        let tx = ledger.submit_anchor(&hash, &identity()).await.unwrap();
        let receipt = ledger.receipt(&tx).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(ledger.resolve(&hash).await.unwrap().unwrap().identity, "did:web:example.com");
    }

    #[tokio::test]
    async fn test_duplicate_anchor_reverts() {
        let ledger = MemoryLedger::new("0xaccount");
        let hash = ContentHash::of(b"a");
        ledger.submit_anchor(&hash, &identity()).await.unwrap();
        let err = ledger.submit_anchor(&hash, &identity()).await.unwrap_err();
        assert!(matches!(err, RegistryError::Reverted { .. }));
    }

    #[tokio::test]
    async fn test_held_transactions_mined_on_release() {
        let ledger = MemoryLedger::new("0xaccount");
        ledger.hold_confirmations(true);
        let hash = ContentHash::of(b"held");
        let tx = ledger.submit_anchor(&hash, &identity()).await.unwrap();
        assert_eq!(ledger.receipt(&tx).await.unwrap(), None);
        assert!(ledger.resolve(&hash).await.unwrap().is_none());

        ledger.release_pending();
        assert!(ledger.receipt(&tx).await.unwrap().unwrap().success);
        assert!(ledger.resolve(&hash).await.unwrap().is_some());
    }
}
