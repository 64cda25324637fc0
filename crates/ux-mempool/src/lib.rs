//! # ux-mempool
//!
//! Transaction mempool for the uxnode blockchain.
//!
//! This crate provides:
//! - Bounded transaction storage (quantity and lifetime limits)
//! - Atomic acceptance checking duplicates, capacity, and per-sender
//!   nonce monotonicity
//! - Final-transaction drains for block assembly

mod error;
mod pool;

pub use error::{MempoolError, MempoolResult};
pub use pool::{Mempool, MempoolConfig, PooledTransaction};

/// Default maximum number of transactions in the pool.
pub const MEMPOOL_TX_QTY: usize = 500;

/// Default transaction lifetime in seconds (24 hours).
pub const MEMPOOL_TX_LIFETIME_SECS: u64 = 24 * 60 * 60;
