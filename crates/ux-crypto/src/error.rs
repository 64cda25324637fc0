//! Crypto error types.

use thiserror::Error;

/// Crypto errors.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Invalid public key bytes.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid secret key bytes.
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    /// Invalid address string.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
