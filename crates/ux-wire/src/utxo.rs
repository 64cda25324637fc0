//! UTXO wire schema.

use crate::enc::{get_count, get_u32};
use crate::{TxOutput, WireResult};
use bytes::{BufMut, Bytes, BytesMut};

/// The surviving outputs of one transaction.
///
/// `indexes[i]` is the output index within the source transaction of
/// `outputs[i]`; spent outputs are simply absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Utxo {
    /// Output indexes still unspent.
    pub indexes: Vec<u32>,
    /// The corresponding outputs.
    pub outputs: Vec<TxOutput>,
}

impl Utxo {
    /// True iff every output has been spent.
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Find the output at a given source index.
    pub fn output_at(&self, index: u32) -> Option<&TxOutput> {
        self.indexes
            .iter()
            .position(|&i| i == index)
            .map(|pos| &self.outputs[pos])
    }

    /// Remove the output at a given source index, returning it.
    pub fn spend(&mut self, index: u32) -> Option<TxOutput> {
        let pos = self.indexes.iter().position(|&i| i == index)?;
        self.indexes.remove(pos);
        Some(self.outputs.remove(pos))
    }

    /// Encode to bytes for storage or the wire.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32_le(self.indexes.len() as u32);
        for index in &self.indexes {
            buf.put_u32_le(*index);
        }
        for output in &self.outputs {
            output.encode(&mut buf);
        }
        buf.to_vec()
    }

    /// Decode from bytes.
    pub fn decode(mut buf: Bytes) -> WireResult<Self> {
        let count = get_count(&mut buf, "utxo index")?;
        let mut indexes = Vec::with_capacity(count);
        for _ in 0..count {
            indexes.push(get_u32(&mut buf, "utxo index")?);
        }
        let mut outputs = Vec::with_capacity(count);
        for _ in 0..count {
            outputs.push(TxOutput::decode(&mut buf)?);
        }
        Ok(Self { indexes, outputs })
    }
}
