//! Storage error types.

use thiserror::Error;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying database error.
    #[error("Database error: {0}")]
    Database(#[from] rocksdb::Error),

    /// Missing column family.
    #[error("Unknown column family: {0}")]
    UnknownColumn(String),

    /// Stored bytes failed to decode.
    #[error("Corrupted record: {0}")]
    Corrupted(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
