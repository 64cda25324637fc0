//! Transaction wire schema.

use crate::enc::{
    get_array, get_bytes, get_count, get_option, get_string, get_u16, get_u32, get_u64, put_bytes,
    put_option, put_string,
};
use crate::WireResult;
use bytes::{BufMut, Bytes, BytesMut};
use ux_crypto::{Address, ADDRESS_LENGTH, SIGNATURE_LENGTH};

/// A reference to a previous transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Hash of the transaction being spent.
    pub tx_hash: [u8; 32],
    /// Index of the output within that transaction.
    pub n_tx_output: u32,
}

impl TxInput {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.tx_hash);
        buf.put_u32_le(self.n_tx_output);
    }

    fn decode(buf: &mut Bytes) -> WireResult<Self> {
        let tx_hash = get_array::<32>(buf, "input tx hash")?;
        let n_tx_output = get_u32(buf, "input index")?;
        Ok(Self { tx_hash, n_tx_output })
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Amount of coins.
    pub amount: u64,
    /// Receiving address.
    pub receiver_addr: Address,
    /// Contract code, for contract-creating outputs.
    pub contract_code: Option<String>,
    /// Change receiver for contract invocations.
    pub addr_change_receiver: Option<Address>,
}

impl TxOutput {
    /// A plain coin transfer output.
    pub fn transfer(amount: u64, receiver_addr: Address) -> Self {
        Self {
            amount,
            receiver_addr,
            contract_code: None,
            addr_change_receiver: None,
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.amount);
        buf.put_slice(&self.receiver_addr);
        put_option(buf, &self.contract_code, |buf, c| put_string(buf, c));
        put_option(buf, &self.addr_change_receiver, |buf, a| buf.put_slice(a));
    }

    pub(crate) fn decode(buf: &mut Bytes) -> WireResult<Self> {
        let amount = get_u64(buf, "output amount")?;
        let receiver_addr = get_array::<ADDRESS_LENGTH>(buf, "receiver address")?;
        let contract_code = get_option(buf, "contract code", |buf| get_string(buf, "contract code"))?;
        let addr_change_receiver = get_option(buf, "change receiver", |buf| {
            get_array::<ADDRESS_LENGTH>(buf, "change receiver")
        })?;
        Ok(Self {
            amount,
            receiver_addr,
            contract_code,
            addr_change_receiver,
        })
    }
}

/// The signed portion of a transaction.
///
/// The transaction hash covers exactly these fields; claim proofs and the
/// optional contract-owner signature are excluded so that adding proofs
/// never changes the transaction identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPayload {
    /// Schema version.
    pub version: u16,
    /// Concilium lane this transaction belongs to.
    pub concilium_id: u32,
    /// Sender account nonce.
    pub nonce: u64,
    /// Maximum coins the sender will spend on fees.
    pub gas_limit: u64,
    /// Spent outputs.
    pub ins: Vec<TxInput>,
    /// Created outputs.
    pub outs: Vec<TxOutput>,
}

impl TransactionPayload {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.version);
        buf.put_u32_le(self.concilium_id);
        buf.put_u64_le(self.nonce);
        buf.put_u64_le(self.gas_limit);
        buf.put_u32_le(self.ins.len() as u32);
        for input in &self.ins {
            input.encode(buf);
        }
        buf.put_u32_le(self.outs.len() as u32);
        for output in &self.outs {
            output.encode(buf);
        }
    }

    pub(crate) fn decode(buf: &mut Bytes) -> WireResult<Self> {
        let version = get_u16(buf, "tx version")?;
        let concilium_id = get_u32(buf, "tx concilium id")?;
        let nonce = get_u64(buf, "tx nonce")?;
        let gas_limit = get_u64(buf, "tx gas limit")?;
        let in_count = get_count(buf, "tx input")?;
        let mut ins = Vec::with_capacity(in_count);
        for _ in 0..in_count {
            ins.push(TxInput::decode(buf)?);
        }
        let out_count = get_count(buf, "tx output")?;
        let mut outs = Vec::with_capacity(out_count);
        for _ in 0..out_count {
            outs.push(TxOutput::decode(buf)?);
        }
        Ok(Self {
            version,
            concilium_id,
            nonce,
            gas_limit,
            ins,
            outs,
        })
    }

    /// True iff any output creates or invokes a contract.
    pub fn has_contract_output(&self) -> bool {
        self.outs.iter().any(|o| o.contract_code.is_some())
    }

    /// The fee this transaction owes.
    pub fn fee(&self) -> u64 {
        if self.has_contract_output() {
            crate::CONTRACT_FEE
        } else {
            crate::TX_FEE
        }
    }

    /// Total coins across all outputs.
    pub fn total_out_amount(&self) -> u64 {
        self.outs.iter().map(|o| o.amount).sum()
    }
}

/// A complete transaction: the hashed payload plus claim proofs and an
/// optional contract-owner signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// The hashed payload.
    pub payload: TransactionPayload,
    /// One claim proof per input.
    pub claim_proofs: Vec<Vec<u8>>,
    /// Optional contract-owner signature.
    pub tx_signature: Option<[u8; SIGNATURE_LENGTH]>,
}

impl Transaction {
    /// Create an unproven transaction from a payload.
    pub fn new(payload: TransactionPayload) -> Self {
        Self {
            payload,
            claim_proofs: Vec::new(),
            tx_signature: None,
        }
    }

    /// The transaction hash: Keccak-256 of the encoded payload only.
    pub fn hash(&self) -> [u8; 32] {
        let mut buf = BytesMut::new();
        self.payload.encode(&mut buf);
        ux_crypto::keccak256(&buf)
    }

    /// Serialize to owned bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.to_vec()
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> WireResult<Self> {
        let mut buf = Bytes::copy_from_slice(bytes);
        Self::decode(&mut buf)
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        self.payload.encode(buf);
        buf.put_u32_le(self.claim_proofs.len() as u32);
        for proof in &self.claim_proofs {
            put_bytes(buf, proof);
        }
        put_option(buf, &self.tx_signature, |buf, s| buf.put_slice(s));
    }

    pub(crate) fn decode(buf: &mut Bytes) -> WireResult<Self> {
        let payload = TransactionPayload::decode(buf)?;
        let proof_count = get_count(buf, "claim proof")?;
        let mut claim_proofs = Vec::with_capacity(proof_count);
        for _ in 0..proof_count {
            claim_proofs.push(get_bytes(buf, "claim proof")?);
        }
        let tx_signature = get_option(buf, "tx signature", |buf| {
            get_array::<SIGNATURE_LENGTH>(buf, "tx signature")
        })?;
        Ok(Self {
            payload,
            claim_proofs,
            tx_signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> TransactionPayload {
        TransactionPayload {
            version: 1,
            concilium_id: 2,
            nonce: 5,
            gas_limit: 100,
            ins: vec![TxInput {
                tx_hash: [0xaa; 32],
                n_tx_output: 1,
            }],
            outs: vec![
                TxOutput::transfer(500, [0x11; 20]),
                TxOutput {
                    amount: 0,
                    receiver_addr: [0x22; 20],
                    contract_code: Some("contract body".to_string()),
                    addr_change_receiver: Some([0x33; 20]),
                },
            ],
        }
    }

    #[test]
    fn test_transaction_roundtrip() {
        let tx = Transaction {
            payload: sample_payload(),
            claim_proofs: vec![vec![1, 2, 3], vec![4, 5]],
            tx_signature: Some([7u8; 64]),
        };

        let mut buf = BytesMut::new();
        tx.encode(&mut buf);
        let decoded = Transaction::decode(&mut buf.freeze()).unwrap();
        assert_eq!(tx, decoded);
    }

    #[test]
    fn test_hash_ignores_proofs_and_signature() {
        let bare = Transaction::new(sample_payload());
        let proven = Transaction {
            payload: sample_payload(),
            claim_proofs: vec![vec![9, 9, 9]],
            tx_signature: Some([1u8; 64]),
        };
        assert_eq!(bare.hash(), proven.hash());

        // Permuting proofs does not change the hash either
        let reordered = Transaction {
            claim_proofs: vec![vec![1], vec![2]],
            ..proven.clone()
        };
        let swapped = Transaction {
            claim_proofs: vec![vec![2], vec![1]],
            ..proven
        };
        assert_eq!(reordered.hash(), swapped.hash());
    }

    #[test]
    fn test_hash_covers_payload() {
        let a = Transaction::new(sample_payload());
        let mut changed = sample_payload();
        changed.nonce += 1;
        let b = Transaction::new(changed);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_contract_detection_and_totals() {
        let payload = sample_payload();
        assert!(payload.has_contract_output());
        assert_eq!(payload.total_out_amount(), 500);
    }

    #[test]
    fn test_truncated_decode_fails() {
        let tx = Transaction::new(sample_payload());
        let mut buf = BytesMut::new();
        tx.encode(&mut buf);
        let bytes = buf.freeze();
        let mut short = bytes.slice(..bytes.len() - 3);
        assert!(Transaction::decode(&mut short).is_err());
    }
}
