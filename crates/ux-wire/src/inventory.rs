//! Inventory announcements.

use crate::enc::{get_array, get_count, get_u8};
use crate::{WireError, WireResult};
use bytes::{BufMut, Bytes, BytesMut};

/// Inventory object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InvType {
    /// A transaction.
    Tx = 11,
    /// A block.
    Block = 21,
}

impl TryFrom<u8> for InvType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            11 => Ok(InvType::Tx),
            21 => Ok(InvType::Block),
            other => Err(WireError::Decode(format!("unknown inv type: {}", other))),
        }
    }
}

/// A single inventory entry inviting the peer to request the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryVector {
    /// Object type.
    pub inv_type: InvType,
    /// Object hash.
    pub hash: [u8; 32],
}

impl InventoryVector {
    /// Announce a transaction.
    pub fn tx(hash: [u8; 32]) -> Self {
        Self {
            inv_type: InvType::Tx,
            hash,
        }
    }

    /// Announce a block.
    pub fn block(hash: [u8; 32]) -> Self {
        Self {
            inv_type: InvType::Block,
            hash,
        }
    }
}

/// A list of inventory entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Inventory(pub Vec<InventoryVector>);

impl Inventory {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.0.len() as u32);
        for item in &self.0 {
            buf.put_u8(item.inv_type as u8);
            buf.put_slice(&item.hash);
        }
    }

    pub(crate) fn decode(buf: &mut Bytes) -> WireResult<Self> {
        let count = get_count(buf, "inventory")?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let inv_type = InvType::try_from(get_u8(buf, "inv type")?)?;
            let hash = get_array::<32>(buf, "inv hash")?;
            items.push(InventoryVector { inv_type, hash });
        }
        Ok(Self(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inv_type_values() {
        assert_eq!(InvType::Tx as u8, 11);
        assert_eq!(InvType::Block as u8, 21);
        assert!(InvType::try_from(12).is_err());
    }

    #[test]
    fn test_inventory_roundtrip() {
        let inv = Inventory(vec![InventoryVector::tx([1u8; 32]), InventoryVector::block([2u8; 32])]);
        let mut buf = BytesMut::new();
        inv.encode(&mut buf);
        let decoded = Inventory::decode(&mut buf.freeze()).unwrap();
        assert_eq!(inv, decoded);
    }
}
