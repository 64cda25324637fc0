//! The witness/concilium boundary.
//!
//! The BFT round machine itself is an external collaborator; this module
//! holds what the node shares with it: concilium membership, round-robin
//! producer order, and block assembly under a wall-clock budget.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;
use ux_crypto::{Address, PUBLIC_KEY_LENGTH};
use ux_mempool::Mempool;
use ux_wire::{Block, BlockHeader, Transaction, TransactionPayload, TxOutput};

/// Wall-clock budget for appending transactions to a block under
/// assembly.
pub const BLOCK_CREATION_TIME_LIMIT: Duration = Duration::from_millis(1500);

/// A named set of witness public keys producing blocks for one lane.
#[derive(Debug, Clone)]
pub struct Concilium {
    /// Numeric lane id.
    pub id: u32,
    /// Witness public keys, in producer rotation order.
    pub witnesses: Vec<[u8; PUBLIC_KEY_LENGTH]>,
}

impl Concilium {
    /// Create a concilium.
    pub fn new(id: u32, witnesses: Vec<[u8; PUBLIC_KEY_LENGTH]>) -> Self {
        Self { id, witnesses }
    }

    /// The producer for a given round, rotating round-robin.
    pub fn producer_at(&self, round: u64) -> Option<&[u8; PUBLIC_KEY_LENGTH]> {
        if self.witnesses.is_empty() {
            return None;
        }
        self.witnesses.get((round % self.witnesses.len() as u64) as usize)
    }

    /// True iff the public key belongs to this concilium.
    pub fn contains(&self, public_key: &[u8]) -> bool {
        self.witnesses.iter().any(|w| w[..] == *public_key)
    }

    /// Votes required for a BFT decision: strictly more than two thirds.
    pub fn quorum(&self) -> usize {
        self.witnesses.len() * 2 / 3 + 1
    }
}

/// Merkle root over transaction hashes: pairwise Keccak-256, the last
/// hash duplicated on odd levels.
fn merkle_root(hashes: &[[u8; 32]]) -> [u8; 32] {
    if hashes.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<[u8; 32]> = hashes.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / 2 + 1);
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            let mut concat = [0u8; 64];
            concat[..32].copy_from_slice(&left);
            concat[32..].copy_from_slice(&right);
            next.push(ux_crypto::keccak256(&concat));
        }
        level = next;
    }
    level[0]
}

/// Build the coinbase crediting the producer with the fees of the
/// included transactions.
fn coinbase(producer: Address, fees: u64, height: u32) -> Transaction {
    Transaction::new(TransactionPayload {
        version: 1,
        concilium_id: 0,
        nonce: height as u64,
        gas_limit: 0,
        ins: Vec::new(),
        outs: vec![TxOutput::transfer(fees, producer)],
    })
}

/// Assemble a block from the mempool under the wall-clock budget.
///
/// The coinbase is always included. Transactions are appended in mempool
/// order until the budget is spent; the transaction that overran the
/// budget is still included, then assembly stops.
pub fn assemble_block(
    mempool: &Mempool,
    parent_hashes: Vec<[u8; 32]>,
    concilium_id: u32,
    height: u32,
    producer: Address,
    budget: Duration,
) -> Block {
    let started = Instant::now();
    let mut txns: Vec<Transaction> = Vec::new();
    let mut fees: u64 = 0;

    for tx in mempool.get_final_txns() {
        fees = fees.saturating_add(tx.payload.fee());
        txns.push(tx);
        if started.elapsed() >= budget {
            debug!(
                included = txns.len(),
                "Block assembly budget spent, stopping"
            );
            break;
        }
    }

    let mut all = Vec::with_capacity(txns.len() + 1);
    all.push(coinbase(producer, fees, height));
    all.extend(txns);

    let hashes: Vec<[u8; 32]> = all.iter().map(|t| t.hash()).collect();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    Block {
        header: BlockHeader {
            parent_hashes,
            merkle_root: merkle_root(&hashes),
            concilium_id,
            timestamp,
            version: 1,
            height,
        },
        txns: all,
        signatures: Vec::new(),
    }
}
