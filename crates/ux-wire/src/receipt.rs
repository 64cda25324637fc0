//! Transaction receipts.

use crate::enc::{get_array, get_count, get_option, get_string, get_u64, get_u8, put_option, put_string};
use crate::{TxOutput, WireError, WireResult};
use bytes::{BufMut, Bytes, BytesMut};
use ux_crypto::{Address, ADDRESS_LENGTH};

/// Execution outcome of a contract transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReceiptStatus {
    /// Execution failed; fees were still charged.
    Failed = 0,
    /// Execution succeeded.
    Ok = 1,
}

impl TryFrom<u8> for ReceiptStatus {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReceiptStatus::Failed),
            1 => Ok(ReceiptStatus::Ok),
            other => Err(WireError::Decode(format!("unknown receipt status: {}", other))),
        }
    }
}

/// The persisted result of executing a contract transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// Address of a created contract.
    pub contract_address: Option<Address>,
    /// Coins consumed by execution.
    pub coins_used: u64,
    /// Execution status.
    pub status: ReceiptStatus,
    /// Failure message, when status is `Failed`.
    pub message: Option<String>,
    /// Hashes of internal transactions spawned by the contract.
    pub internal_txns: Vec<[u8; 32]>,
    /// Outputs created on behalf of the contract.
    pub coins: Vec<TxOutput>,
}

impl TxReceipt {
    /// Encode to bytes for storage.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_option(&mut buf, &self.contract_address, |buf, a| buf.put_slice(a));
        buf.put_u64_le(self.coins_used);
        buf.put_u8(self.status as u8);
        put_option(&mut buf, &self.message, |buf, m| put_string(buf, m));
        buf.put_u32_le(self.internal_txns.len() as u32);
        for hash in &self.internal_txns {
            buf.put_slice(hash);
        }
        buf.put_u32_le(self.coins.len() as u32);
        for output in &self.coins {
            output.encode(&mut buf);
        }
        buf.to_vec()
    }

    /// Decode from bytes.
    pub fn decode(mut buf: Bytes) -> WireResult<Self> {
        let contract_address = get_option(&mut buf, "contract address", |buf| {
            get_array::<ADDRESS_LENGTH>(buf, "contract address")
        })?;
        let coins_used = get_u64(&mut buf, "coins used")?;
        let status = ReceiptStatus::try_from(get_u8(&mut buf, "receipt status")?)?;
        let message = get_option(&mut buf, "receipt message", |buf| {
            get_string(buf, "receipt message")
        })?;
        let internal_count = get_count(&mut buf, "internal txn")?;
        let mut internal_txns = Vec::with_capacity(internal_count);
        for _ in 0..internal_count {
            internal_txns.push(get_array::<32>(&mut buf, "internal txn")?);
        }
        let coin_count = get_count(&mut buf, "receipt coin")?;
        let mut coins = Vec::with_capacity(coin_count);
        for _ in 0..coin_count {
            coins.push(TxOutput::decode(&mut buf)?);
        }
        Ok(Self {
            contract_address,
            coins_used,
            status,
            message,
            internal_txns,
            coins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_roundtrip() {
        let receipt = TxReceipt {
            contract_address: Some([9u8; 20]),
            coins_used: 3000,
            status: ReceiptStatus::Ok,
            message: None,
            internal_txns: vec![[1u8; 32]],
            coins: vec![TxOutput::transfer(50, [4u8; 20])],
        };
        let decoded = TxReceipt::decode(receipt.encode().into()).unwrap();
        assert_eq!(receipt, decoded);
    }

    #[test]
    fn test_failed_receipt_roundtrip() {
        let receipt = TxReceipt {
            contract_address: None,
            coins_used: 100,
            status: ReceiptStatus::Failed,
            message: Some("out of coins".to_string()),
            internal_txns: vec![],
            coins: vec![],
        };
        let decoded = TxReceipt::decode(receipt.encode().into()).unwrap();
        assert_eq!(receipt, decoded);
        assert_eq!(decoded.status, ReceiptStatus::Failed);
    }
}
