//! Relayed-transaction validation.
//!
//! Checks are ordered so peer-attributable failures are distinguishable
//! from local storage failures: only the former cost the sender a
//! misbehavior point.

use thiserror::Error;
use ux_crypto::Address;
use ux_mempool::Mempool;
use ux_storage::{get_account, Store, StorageError};
use ux_wire::TxMessage;

/// Why a relayed transaction was refused.
#[derive(Error, Debug)]
pub enum TxError {
    /// The message carried no signature/public key pair.
    #[error("Transaction message carries no auth")]
    MissingAuth,

    /// The signature does not verify against the payload hash.
    #[error("Bad transaction signature")]
    BadSignature,

    /// The sender account does not exist.
    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    /// The sender cannot cover outputs plus the fee.
    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: u64, required: u64 },

    /// The declared gas limit does not cover the fee.
    #[error("Gas limit too low: {gas_limit}, fee {fee}")]
    GasTooLow { gas_limit: u64, fee: u64 },

    /// The nonce does not continue the sender's sequence.
    #[error("Bad nonce: got {got}, expected {expected}")]
    BadNonce { got: u64, expected: u64 },

    /// A local storage failure; never charged to the peer.
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl TxError {
    /// True iff the failure is attributable to the sending peer.
    pub fn is_peer_fault(&self) -> bool {
        !matches!(self, TxError::Storage(_))
    }
}

/// Validate a relayed transaction against committed state and the
/// mempool. Returns the sender address and its committed nonce for the
/// mempool admission call.
pub fn validate_tx(
    store: &dyn Store,
    mempool: &Mempool,
    msg: &TxMessage,
) -> Result<(Address, u64), TxError> {
    let auth = msg.auth.as_ref().ok_or(TxError::MissingAuth)?;

    let digest = msg.tx.hash();
    if !ux_crypto::verify(&digest, &auth.signature, &auth.public_key) {
        return Err(TxError::BadSignature);
    }

    let sender = ux_crypto::address(&auth.public_key).map_err(|_| TxError::MissingAuth)?;
    let account = get_account(store, &sender)?
        .ok_or_else(|| TxError::UnknownAccount(ux_crypto::address_to_string(&sender)))?;

    let fee = msg.tx.payload.fee();
    if msg.tx.payload.gas_limit < fee {
        return Err(TxError::GasTooLow {
            gas_limit: msg.tx.payload.gas_limit,
            fee,
        });
    }

    let required = msg.tx.payload.total_out_amount().saturating_add(fee);
    if account.balance < required {
        return Err(TxError::InsufficientFunds {
            balance: account.balance,
            required,
        });
    }

    let expected = account.nonce + mempool.pending_count(&sender);
    if msg.tx.payload.nonce != expected {
        return Err(TxError::BadNonce {
            got: msg.tx.payload.nonce,
            expected,
        });
    }

    Ok((sender, account.nonce))
}
