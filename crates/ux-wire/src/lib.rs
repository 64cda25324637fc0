//! # ux-wire
//!
//! Wire formats for the uxnode blockchain.
//!
//! This crate provides:
//! - The framed message envelope (magic, command tag, length, payload)
//! - The closed [`Message`] enum with deterministic binary encoding
//! - Chain payload schemas: transactions, blocks, inventory, UTXO
//!   records, transaction receipts
//!
//! Signed message kinds carry a `(signature, public key)` pair; decoding
//! never verifies signatures, that is node-level policy.

mod block;
mod enc;
mod envelope;
mod error;
mod inventory;
mod message;
mod receipt;
mod transaction;
mod utxo;

pub use block::{Block, BlockHeader};
pub use envelope::EnvelopeCodec;
pub use error::{WireError, WireResult};
pub use inventory::{Inventory, InventoryVector, InvType};
pub use message::{
    AddrPayload, Capability, Message, MessageAuth, PeerInfo, RejectPayload, Service, TxMessage,
    VersionPayload, WitnessMessage,
};
pub use receipt::{ReceiptStatus, TxReceipt};
pub use transaction::{Transaction, TransactionPayload, TxInput, TxOutput};
pub use utxo::Utxo;

/// Maximum frame size (and maximum serialized block size).
pub const MAX_BLOCK_SIZE: usize = 1024 * 1024;

/// Reject code sent on a duplicate connection.
pub const REJECT_DUPLICATE: u8 = 0x01;

/// Base fee of a plain transfer transaction.
pub const TX_FEE: u64 = 100;

/// Fee of a contract-creating or contract-invoking transaction.
pub const CONTRACT_FEE: u64 = 3000;

/// Fee of an internal transaction spawned by a contract.
pub const INTERNAL_TX_FEE: u64 = 300;

/// Fee per byte of contract storage written.
pub const STORAGE_PER_BYTE_FEE: u64 = 10;
