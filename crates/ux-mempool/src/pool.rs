//! Transaction pool implementation.

use crate::{MempoolError, MempoolResult, MEMPOOL_TX_LIFETIME_SECS, MEMPOOL_TX_QTY};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use ux_crypto::Address;
use ux_wire::{MessageAuth, Transaction, TxMessage};

/// Mempool configuration.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of transactions.
    pub max_transactions: usize,
    /// Transaction lifetime before eviction.
    pub tx_lifetime: Duration,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: MEMPOOL_TX_QTY,
            tx_lifetime: Duration::from_secs(MEMPOOL_TX_LIFETIME_SECS),
        }
    }
}

/// A transaction held in the pool.
#[derive(Debug, Clone)]
pub struct PooledTransaction {
    /// The transaction.
    pub tx: Transaction,
    /// Relay auth the transaction arrived with, kept so the transaction
    /// can be re-served to peers requesting it.
    pub auth: Option<MessageAuth>,
    /// Sender account address.
    pub sender: Address,
    /// Arrival time.
    pub arrival: Instant,
    /// Arrival sequence number, for stable drain order.
    seq: u64,
}

struct PoolInner {
    txs: HashMap<[u8; 32], PooledTransaction>,
    next_seq: u64,
}

/// Transaction mempool.
///
/// All checks in [`Mempool::accept`] happen under one lock, so two peers
/// relaying the same transaction concurrently admit it exactly once.
pub struct Mempool {
    config: MempoolConfig,
    inner: Mutex<PoolInner>,
}

impl Mempool {
    /// Create a new mempool with the given configuration.
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(PoolInner {
                txs: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MempoolConfig::default())
    }

    /// Try to admit a relayed transaction.
    ///
    /// Checks, atomically: duplicates (returns `Ok(false)`), capacity
    /// (`Full`), and nonce monotonicity against the committed account
    /// nonce plus the sender's already-pending transactions (`BadNonce`).
    /// Returns `Ok(true)` iff the transaction was newly admitted.
    pub fn accept(
        &self,
        tx: Transaction,
        auth: Option<MessageAuth>,
        sender: Address,
        account_nonce: u64,
    ) -> MempoolResult<bool> {
        let hash = tx.hash();
        let mut inner = self.inner.lock();

        if inner.txs.contains_key(&hash) {
            debug!(tx = %hex::encode(hash), "Transaction already in mempool");
            return Ok(false);
        }

        if inner.txs.len() >= self.config.max_transactions {
            return Err(MempoolError::Full {
                count: inner.txs.len(),
                max: self.config.max_transactions,
            });
        }

        let pending = inner
            .txs
            .values()
            .filter(|p| p.sender == sender)
            .count() as u64;
        let expected = account_nonce + pending;
        if tx.payload.nonce != expected {
            return Err(MempoolError::BadNonce {
                sender: ux_crypto::address_to_string(&sender),
                got: tx.payload.nonce,
                expected,
            });
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.txs.insert(
            hash,
            PooledTransaction {
                tx,
                auth,
                sender,
                arrival: Instant::now(),
                seq,
            },
        );
        debug!(
            tx = %hex::encode(hash),
            count = inner.txs.len(),
            "Transaction admitted to mempool"
        );
        Ok(true)
    }

    /// Insert a locally built transaction without relay validation.
    pub fn add_tx(&self, tx: Transaction, sender: Address) {
        let hash = tx.hash();
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.txs.insert(
            hash,
            PooledTransaction {
                tx,
                auth: None,
                sender,
                arrival: Instant::now(),
                seq,
            },
        );
    }

    /// Snapshot the pool in arrival order, for block assembly.
    pub fn get_final_txns(&self) -> Vec<Transaction> {
        let inner = self.inner.lock();
        let mut pooled: Vec<&PooledTransaction> = inner.txs.values().collect();
        pooled.sort_by_key(|p| p.seq);
        pooled.into_iter().map(|p| p.tx.clone()).collect()
    }

    /// Number of pending transactions from a sender.
    pub fn pending_count(&self, sender: &Address) -> u64 {
        self.inner
            .lock()
            .txs
            .values()
            .filter(|p| p.sender == *sender)
            .count() as u64
    }

    /// Check if a transaction is in the pool.
    pub fn contains(&self, hash: &[u8; 32]) -> bool {
        self.inner.lock().txs.contains_key(hash)
    }

    /// Fetch a transaction by hash.
    pub fn get(&self, hash: &[u8; 32]) -> Option<Transaction> {
        self.inner.lock().txs.get(hash).map(|p| p.tx.clone())
    }

    /// Fetch a transaction as a relayable message, with the auth it
    /// arrived with.
    pub fn get_message(&self, hash: &[u8; 32]) -> Option<TxMessage> {
        self.inner.lock().txs.get(hash).map(|p| TxMessage {
            tx: p.tx.clone(),
            auth: p.auth.clone(),
        })
    }

    /// Remove transactions committed in a block.
    pub fn remove_committed(&self, hashes: &[[u8; 32]]) {
        let mut inner = self.inner.lock();
        for hash in hashes {
            inner.txs.remove(hash);
        }
    }

    /// Evict transactions older than the configured lifetime.
    /// Returns the number evicted.
    pub fn sweep_expired(&self) -> usize {
        let lifetime = self.config.tx_lifetime;
        let mut inner = self.inner.lock();
        let before = inner.txs.len();
        inner.txs.retain(|_, p| p.arrival.elapsed() < lifetime);
        let evicted = before - inner.txs.len();
        if evicted > 0 {
            warn!(evicted, "Evicted expired mempool transactions");
        }
        evicted
    }

    /// Number of transactions in the pool.
    pub fn len(&self) -> usize {
        self.inner.lock().txs.len()
    }

    /// True iff the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().txs.is_empty()
    }
}
