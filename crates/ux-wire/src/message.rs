//! P2P protocol messages.
//!
//! Every message is identified by a short ASCII command tag. The enum is
//! closed: unknown tags fail decoding with
//! [`WireError::UnknownMessageType`]. Signed kinds (`tx` and the witness
//! messages) carry an optional `(signature, public key)` pair after their
//! payload; decoding does not verify it.

use crate::enc::{
    get_array, get_bytes, get_count, get_option, get_string, get_u16, get_u32, get_u64, get_u8,
    put_bytes, put_option, put_string,
};
use crate::{Block, Inventory, Transaction, WireError, WireResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use ux_crypto::{PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

/// Service kinds a peer can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Service {
    /// General network participation.
    Node = 1,
    /// Block producer; capability data is the witness public key.
    Witness = 2,
}

impl TryFrom<u8> for Service {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Service::Node),
            2 => Ok(Service::Witness),
            other => Err(WireError::Decode(format!("unknown service kind: {}", other))),
        }
    }
}

/// A single advertised capability: a service kind plus opaque data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Service kind.
    pub service: Service,
    /// Opaque capability data (witness public key for `Witness`).
    pub data: Option<Vec<u8>>,
}

impl Capability {
    /// A plain node capability.
    pub fn node() -> Self {
        Self {
            service: Service::Node,
            data: None,
        }
    }

    /// A witness capability carrying the witness public key.
    pub fn witness(public_key: Vec<u8>) -> Self {
        Self {
            service: Service::Witness,
            data: Some(public_key),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.service as u8);
        put_option(buf, &self.data, |buf, d| put_bytes(buf, d));
    }

    fn decode(buf: &mut Bytes) -> WireResult<Self> {
        let service = Service::try_from(get_u8(buf, "capability service")?)?;
        let data = get_option(buf, "capability data", |buf| {
            get_bytes(buf, "capability data bytes")
        })?;
        Ok(Self { service, data })
    }
}

/// An advertised peer descriptor.
///
/// The address is family-agnostic canonical bytes (16-byte IPv6-mapped
/// form for IP peers); it is the identity key of the address book and
/// must be stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Canonical address bytes.
    pub address: Vec<u8>,
    /// Transport port.
    pub port: u16,
    /// Advertised capabilities.
    pub capabilities: Vec<Capability>,
}

impl PeerInfo {
    /// Create a descriptor with a single capability.
    pub fn new(address: Vec<u8>, port: u16, capability: Capability) -> Self {
        Self {
            address,
            port,
            capabilities: vec![capability],
        }
    }

    /// True iff any capability matches the service kind.
    pub fn has_service(&self, service: Service) -> bool {
        self.capabilities.iter().any(|c| c.service == service)
    }

    /// Merge another descriptor's capabilities into this one, deduplicated.
    pub fn merge_capabilities(&mut self, other: &PeerInfo) {
        for cap in &other.capabilities {
            if !self.capabilities.contains(cap) {
                self.capabilities.push(cap.clone());
            }
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        put_bytes(buf, &self.address);
        buf.put_u16_le(self.port);
        buf.put_u32_le(self.capabilities.len() as u32);
        for cap in &self.capabilities {
            cap.encode(buf);
        }
    }

    pub(crate) fn decode(buf: &mut Bytes) -> WireResult<Self> {
        let address = get_bytes(buf, "peer address")?;
        let port = get_u16(buf, "peer port")?;
        let count = get_count(buf, "capability")?;
        let mut capabilities = Vec::with_capacity(count);
        for _ in 0..count {
            capabilities.push(Capability::decode(buf)?);
        }
        Ok(Self {
            address,
            port,
            capabilities,
        })
    }
}

/// Signature and public key attached to signed message kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAuth {
    /// Compact ECDSA signature.
    pub signature: [u8; SIGNATURE_LENGTH],
    /// Compressed public key of the signer.
    pub public_key: [u8; PUBLIC_KEY_LENGTH],
}

impl MessageAuth {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.signature);
        buf.put_slice(&self.public_key);
    }

    fn decode(buf: &mut Bytes) -> WireResult<Self> {
        let signature = get_array::<SIGNATURE_LENGTH>(buf, "signature")?;
        let public_key = get_array::<PUBLIC_KEY_LENGTH>(buf, "public key")?;
        Ok(Self {
            signature,
            public_key,
        })
    }

    fn encode_opt(auth: &Option<MessageAuth>, buf: &mut BytesMut) {
        put_option(buf, auth, |buf, a| a.encode(buf));
    }

    fn decode_opt(buf: &mut Bytes) -> WireResult<Option<MessageAuth>> {
        get_option(buf, "message auth", MessageAuth::decode)
    }
}

/// `version` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPayload {
    /// Protocol version of the sender.
    pub protocol_version: u16,
    /// Random connection nonce, for self-connection detection.
    pub nonce: u64,
    /// Sender wall clock, milliseconds since the epoch.
    pub timestamp: u64,
    /// The sender's own descriptor.
    pub peer_info: PeerInfo,
}

/// `addr` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrPayload {
    /// Advertised peers.
    pub peers: Vec<PeerInfo>,
}

/// `reject` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectPayload {
    /// Machine-readable reject code.
    pub code: u8,
    /// Human-readable reason.
    pub reason: String,
}

/// A transaction message: the transaction plus its envelope auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxMessage {
    /// The transaction.
    pub tx: Transaction,
    /// Signature over the payload hash plus the sender public key.
    pub auth: Option<MessageAuth>,
}

/// A witness consensus message. The round payload is opaque to the
/// networking core; only the concilium routing key is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessMessage {
    /// Concilium the message belongs to.
    pub concilium_id: u32,
    /// Opaque consensus round data.
    pub data: Vec<u8>,
    /// Witness signature and public key.
    pub auth: Option<MessageAuth>,
}

impl WitnessMessage {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.concilium_id);
        put_bytes(buf, &self.data);
        MessageAuth::encode_opt(&self.auth, buf);
    }

    fn decode(buf: &mut Bytes) -> WireResult<Self> {
        let concilium_id = get_u32(buf, "concilium id")?;
        let data = get_bytes(buf, "witness data")?;
        let auth = MessageAuth::decode_opt(buf)?;
        Ok(Self {
            concilium_id,
            data,
            auth,
        })
    }
}

/// A P2P message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Handshake opener.
    Version(VersionPayload),
    /// Handshake acknowledgment.
    VerAck,
    /// Request the peer's address book.
    GetAddr,
    /// Address book gossip.
    Addr(AddrPayload),
    /// Policy rejection.
    Reject(RejectPayload),
    /// Transaction relay.
    Tx(TxMessage),
    /// Full block relay.
    Block(Block),
    /// Inventory announcement.
    Inv(Inventory),
    /// Request announced objects.
    GetData(Inventory),
    /// Request blocks after the given known hashes.
    GetBlocks(Vec<[u8; 32]>),
    /// Heartbeat request.
    Ping,
    /// Heartbeat reply.
    Pong,
    /// Witness round: handshake.
    WitnessHandshake(WitnessMessage),
    /// Witness round: next-round proposal.
    WitnessNextRound(WitnessMessage),
    /// Witness round: expose.
    WitnessExpose(WitnessMessage),
    /// Witness round: block proposal.
    WitnessBlock(WitnessMessage),
    /// Witness round: block vote.
    WitnessBlockVote(WitnessMessage),
}

impl Message {
    /// The command tag of this message.
    pub fn command(&self) -> &'static str {
        match self {
            Message::Version(_) => "version",
            Message::VerAck => "verack",
            Message::GetAddr => "getaddr",
            Message::Addr(_) => "addr",
            Message::Reject(_) => "reject",
            Message::Tx(_) => "tx",
            Message::Block(_) => "block",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::GetBlocks(_) => "getblocks",
            Message::Ping => "ping",
            Message::Pong => "pong",
            Message::WitnessHandshake(_) => "w_handshake",
            Message::WitnessNextRound(_) => "w_nextround",
            Message::WitnessExpose(_) => "w_expose",
            Message::WitnessBlock(_) => "w_block",
            Message::WitnessBlockVote(_) => "w_block_vote",
        }
    }

    /// Encode the payload (everything after the envelope header).
    pub fn encode_payload(&self) -> WireResult<Bytes> {
        let mut buf = BytesMut::new();
        match self {
            Message::Version(v) => {
                buf.put_u16_le(v.protocol_version);
                buf.put_u64_le(v.nonce);
                buf.put_u64_le(v.timestamp);
                v.peer_info.encode(&mut buf);
            }
            Message::VerAck | Message::GetAddr | Message::Ping | Message::Pong => {}
            Message::Addr(a) => {
                buf.put_u32_le(a.peers.len() as u32);
                for peer in &a.peers {
                    peer.encode(&mut buf);
                }
            }
            Message::Reject(r) => {
                buf.put_u8(r.code);
                put_string(&mut buf, &r.reason);
            }
            Message::Tx(t) => {
                t.tx.encode(&mut buf);
                MessageAuth::encode_opt(&t.auth, &mut buf);
            }
            Message::Block(b) => {
                b.encode(&mut buf);
            }
            Message::Inv(inv) | Message::GetData(inv) => {
                inv.encode(&mut buf);
            }
            Message::GetBlocks(hashes) => {
                buf.put_u32_le(hashes.len() as u32);
                for hash in hashes {
                    buf.put_slice(hash);
                }
            }
            Message::WitnessHandshake(w)
            | Message::WitnessNextRound(w)
            | Message::WitnessExpose(w)
            | Message::WitnessBlock(w)
            | Message::WitnessBlockVote(w) => {
                w.encode(&mut buf);
            }
        }
        Ok(buf.freeze())
    }

    /// Decode a payload for the given command tag.
    pub fn decode_payload(command: &str, mut buf: Bytes) -> WireResult<Self> {
        let message = match command {
            "version" => {
                let protocol_version = get_u16(&mut buf, "protocol version")?;
                let nonce = get_u64(&mut buf, "nonce")?;
                let timestamp = get_u64(&mut buf, "timestamp")?;
                let peer_info = PeerInfo::decode(&mut buf)?;
                Message::Version(VersionPayload {
                    protocol_version,
                    nonce,
                    timestamp,
                    peer_info,
                })
            }
            "verack" => Message::VerAck,
            "getaddr" => Message::GetAddr,
            "addr" => {
                let count = get_count(&mut buf, "addr")?;
                let mut peers = Vec::with_capacity(count);
                for _ in 0..count {
                    peers.push(PeerInfo::decode(&mut buf)?);
                }
                Message::Addr(AddrPayload { peers })
            }
            "reject" => {
                let code = get_u8(&mut buf, "reject code")?;
                let reason = get_string(&mut buf, "reject reason")?;
                Message::Reject(RejectPayload { code, reason })
            }
            "tx" => {
                let tx = Transaction::decode(&mut buf)?;
                let auth = MessageAuth::decode_opt(&mut buf)?;
                Message::Tx(TxMessage { tx, auth })
            }
            "block" => Message::Block(Block::decode(&mut buf)?),
            "inv" => Message::Inv(Inventory::decode(&mut buf)?),
            "getdata" => Message::GetData(Inventory::decode(&mut buf)?),
            "getblocks" => {
                let count = get_count(&mut buf, "getblocks")?;
                let mut hashes = Vec::with_capacity(count);
                for _ in 0..count {
                    hashes.push(get_array::<32>(&mut buf, "block hash")?);
                }
                Message::GetBlocks(hashes)
            }
            "ping" => Message::Ping,
            "pong" => Message::Pong,
            "w_handshake" => Message::WitnessHandshake(WitnessMessage::decode(&mut buf)?),
            "w_nextround" => Message::WitnessNextRound(WitnessMessage::decode(&mut buf)?),
            "w_expose" => Message::WitnessExpose(WitnessMessage::decode(&mut buf)?),
            "w_block" => Message::WitnessBlock(WitnessMessage::decode(&mut buf)?),
            "w_block_vote" => Message::WitnessBlockVote(WitnessMessage::decode(&mut buf)?),
            other => return Err(WireError::UnknownMessageType(other.to_string())),
        };

        if buf.has_remaining() {
            return Err(WireError::Decode(format!(
                "{} trailing bytes after {} payload",
                buf.remaining(),
                command
            )));
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InvType, InventoryVector, TransactionPayload};

    fn roundtrip(message: Message) {
        let payload = message.encode_payload().unwrap();
        let decoded = Message::decode_payload(message.command(), payload).unwrap();
        assert_eq!(message, decoded);
    }

    fn sample_peer_info() -> PeerInfo {
        PeerInfo {
            address: vec![0; 10].into_iter().chain([0xff, 0xff, 10, 0, 0, 1]).collect(),
            port: 8223,
            capabilities: vec![Capability::node(), Capability::witness(vec![2u8; 33])],
        }
    }

    #[test]
    fn test_version_roundtrip() {
        roundtrip(Message::Version(VersionPayload {
            protocol_version: 0x0123,
            nonce: 0xdead_beef_cafe_f00d,
            timestamp: 1_700_000_000_000,
            peer_info: sample_peer_info(),
        }));
    }

    #[test]
    fn test_empty_kinds_roundtrip() {
        roundtrip(Message::VerAck);
        roundtrip(Message::GetAddr);
        roundtrip(Message::Ping);
        roundtrip(Message::Pong);
    }

    #[test]
    fn test_addr_roundtrip() {
        roundtrip(Message::Addr(AddrPayload {
            peers: vec![sample_peer_info(), sample_peer_info()],
        }));
    }

    #[test]
    fn test_reject_roundtrip() {
        roundtrip(Message::Reject(RejectPayload {
            code: crate::REJECT_DUPLICATE,
            reason: "Duplicate connection detected".to_string(),
        }));
    }

    #[test]
    fn test_tx_roundtrip_with_auth() {
        let tx = Transaction::new(TransactionPayload {
            version: 1,
            concilium_id: 0,
            nonce: 7,
            gas_limit: 200,
            ins: vec![],
            outs: vec![],
        });
        roundtrip(Message::Tx(TxMessage {
            tx,
            auth: Some(MessageAuth {
                signature: [3u8; 64],
                public_key: [4u8; 33],
            }),
        }));
    }

    #[test]
    fn test_inv_roundtrip() {
        let inv = Inventory(vec![
            InventoryVector {
                inv_type: InvType::Tx,
                hash: [9u8; 32],
            },
            InventoryVector {
                inv_type: InvType::Block,
                hash: [7u8; 32],
            },
        ]);
        roundtrip(Message::Inv(inv.clone()));
        roundtrip(Message::GetData(inv));
        roundtrip(Message::GetBlocks(vec![[1u8; 32], [2u8; 32]]));
    }

    #[test]
    fn test_witness_roundtrip() {
        let w = WitnessMessage {
            concilium_id: 3,
            data: vec![1, 2, 3, 4],
            auth: Some(MessageAuth {
                signature: [8u8; 64],
                public_key: [9u8; 33],
            }),
        };
        roundtrip(Message::WitnessHandshake(w.clone()));
        roundtrip(Message::WitnessNextRound(w.clone()));
        roundtrip(Message::WitnessExpose(w.clone()));
        roundtrip(Message::WitnessBlock(w.clone()));
        roundtrip(Message::WitnessBlockVote(w));
    }

    #[test]
    fn test_unknown_command_rejected() {
        let err = Message::decode_payload("frobnicate", Bytes::new()).unwrap_err();
        assert!(matches!(err, WireError::UnknownMessageType(_)));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let err = Message::decode_payload("verack", Bytes::from_static(&[0u8])).unwrap_err();
        assert!(matches!(err, WireError::Decode(_)));
    }

    #[test]
    fn test_capability_merge_idempotent() {
        let mut info = PeerInfo::new(vec![1, 2, 3], 8223, Capability::node());
        let update = PeerInfo::new(vec![1, 2, 3], 8223, Capability::witness(vec![5u8; 33]));

        info.merge_capabilities(&update);
        assert_eq!(info.capabilities.len(), 2);

        // Merging again does not grow the set
        info.merge_capabilities(&update);
        assert_eq!(info.capabilities.len(), 2);
        assert!(info.has_service(Service::Witness));
    }
}
