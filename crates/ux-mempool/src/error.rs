//! Error types for the mempool.

use thiserror::Error;

/// Mempool errors.
#[derive(Error, Debug)]
pub enum MempoolError {
    /// Mempool is at capacity.
    #[error("Mempool full: {count} transactions, max {max}")]
    Full { count: usize, max: usize },

    /// Transaction nonce does not continue the sender's sequence.
    #[error("Bad nonce for {sender}: got {got}, expected {expected}")]
    BadNonce {
        sender: String,
        got: u64,
        expected: u64,
    },
}

/// Result type for mempool operations.
pub type MempoolResult<T> = Result<T, MempoolError>;
