//! Network error types.

use thiserror::Error;

/// Network errors.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// TCP connection did not complete in time.
    #[error("Unreachable: {0}")]
    Unreachable(String),

    /// Name resolution failed.
    #[error("Resolve error: {0}")]
    Resolve(String),

    /// Peer is inside its redial restriction window.
    #[error("Restricted: retry not allowed yet for {0}")]
    Restricted(String),

    /// Peer is banned.
    #[error("Peer banned: {0}")]
    Banned(String),

    /// A live connection for this identity already exists.
    #[error("Duplicate connection: {0}")]
    DuplicateConnection(String),

    /// Connection closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Peer not found in the address book.
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Invalid address string or bytes.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Wire format error.
    #[error("Wire error: {0}")]
    Wire(#[from] ux_wire::WireError),

    /// Storage error while persisting the address book.
    #[error("Storage error: {0}")]
    Storage(#[from] ux_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
