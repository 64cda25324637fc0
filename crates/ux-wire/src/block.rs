//! Block wire schema.

use crate::enc::{get_array, get_count, get_u16, get_u32, get_u64};
use crate::{Transaction, WireResult};
use bytes::{BufMut, Bytes, BytesMut};
use ux_crypto::SIGNATURE_LENGTH;

/// A block header. The block hash covers exactly these fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Hashes of the parent blocks (a DAG lane may have several).
    pub parent_hashes: Vec<[u8; 32]>,
    /// Merkle root over the block's transaction hashes.
    pub merkle_root: [u8; 32],
    /// Concilium lane that produced the block.
    pub concilium_id: u32,
    /// Producer wall clock, seconds since the epoch.
    pub timestamp: u64,
    /// Schema version.
    pub version: u16,
    /// Block height.
    pub height: u32,
}

impl BlockHeader {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.parent_hashes.len() as u32);
        for hash in &self.parent_hashes {
            buf.put_slice(hash);
        }
        buf.put_slice(&self.merkle_root);
        buf.put_u32_le(self.concilium_id);
        buf.put_u64_le(self.timestamp);
        buf.put_u16_le(self.version);
        buf.put_u32_le(self.height);
    }

    pub(crate) fn decode(buf: &mut Bytes) -> WireResult<Self> {
        let parent_count = get_count(buf, "parent hash")?;
        let mut parent_hashes = Vec::with_capacity(parent_count);
        for _ in 0..parent_count {
            parent_hashes.push(get_array::<32>(buf, "parent hash")?);
        }
        let merkle_root = get_array::<32>(buf, "merkle root")?;
        let concilium_id = get_u32(buf, "header concilium id")?;
        let timestamp = get_u64(buf, "header timestamp")?;
        let version = get_u16(buf, "header version")?;
        let height = get_u32(buf, "header height")?;
        Ok(Self {
            parent_hashes,
            merkle_root,
            concilium_id,
            timestamp,
            version,
            height,
        })
    }
}

/// A full block: header, transactions, and witness signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// The hashed header.
    pub header: BlockHeader,
    /// Transactions, coinbase first.
    pub txns: Vec<Transaction>,
    /// Witness signatures over the header hash.
    pub signatures: Vec<[u8; SIGNATURE_LENGTH]>,
}

impl Block {
    /// The block hash: Keccak-256 of the encoded header only.
    pub fn hash(&self) -> [u8; 32] {
        let mut buf = BytesMut::new();
        self.header.encode(&mut buf);
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
        self.header.encode(buf);
        buf.put_u32_le(self.txns.len() as u32);
        for tx in &self.txns {
            tx.encode(buf);
        }
        buf.put_u32_le(self.signatures.len() as u32);
        for sig in &self.signatures {
            buf.put_slice(sig);
        }
    }

    pub(crate) fn decode(buf: &mut Bytes) -> WireResult<Self> {
        let header = BlockHeader::decode(buf)?;
        let tx_count = get_count(buf, "block tx")?;
        let mut txns = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            txns.push(Transaction::decode(buf)?);
        }
        let sig_count = get_count(buf, "block signature")?;
        let mut signatures = Vec::with_capacity(sig_count);
        for _ in 0..sig_count {
            signatures.push(get_array::<SIGNATURE_LENGTH>(buf, "block signature")?);
        }
        Ok(Self {
            header,
            txns,
            signatures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransactionPayload;

    fn sample_block() -> Block {
        Block {
            header: BlockHeader {
                parent_hashes: vec![[1u8; 32], [2u8; 32]],
                merkle_root: [3u8; 32],
                concilium_id: 0,
                timestamp: 1_700_000_000,
                version: 1,
                height: 42,
            },
            txns: vec![Transaction::new(TransactionPayload {
                version: 1,
                concilium_id: 0,
                nonce: 0,
                gas_limit: 100,
                ins: vec![],
                outs: vec![],
            })],
            signatures: vec![[5u8; 64]],
        }
    }

    #[test]
    fn test_block_roundtrip() {
        let block = sample_block();
        let mut buf = BytesMut::new();
        block.encode(&mut buf);
        let decoded = Block::decode(&mut buf.freeze()).unwrap();
        assert_eq!(block, decoded);
    }

    #[test]
    fn test_hash_covers_header_only() {
        let block = sample_block();
        let mut more_sigs = block.clone();
        more_sigs.signatures.push([6u8; 64]);
        assert_eq!(block.hash(), more_sigs.hash());

        let mut taller = block.clone();
        taller.header.height += 1;
        assert_ne!(block.hash(), taller.hash());
    }
}
