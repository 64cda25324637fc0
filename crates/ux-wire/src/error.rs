//! Wire error types.

use thiserror::Error;

/// Wire format errors.
#[derive(Error, Debug)]
pub enum WireError {
    /// Frame carried the wrong network magic.
    #[error("Bad network magic: expected {expected:#010x}, got {got:#010x}")]
    BadMagic { expected: u32, got: u32 },

    /// Unknown message type tag.
    #[error("Unknown message type: {0:?}")]
    UnknownMessageType(String),

    /// Frame exceeds the maximum allowed size.
    #[error("Oversized frame: {size} bytes, max {max} bytes")]
    OversizedFrame { size: usize, max: usize },

    /// Payload failed to decode.
    #[error("Decode failure: {0}")]
    Decode(String),

    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;
