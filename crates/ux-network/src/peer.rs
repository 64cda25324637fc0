//! Per-peer runtime records.

use crate::transport::canonical_address;
use crate::NetworkResult;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use ux_wire::{Message, PeerInfo};

/// Identity of a peer in the address book: canonical address bytes plus
/// the advertised transport port. Stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerKey {
    /// Canonical address bytes (16-byte IPv6-mapped form for IP peers).
    pub address: Vec<u8>,
    /// Transport port.
    pub port: u16,
}

impl PeerKey {
    /// Build a key from canonical parts.
    pub fn new(address: Vec<u8>, port: u16) -> Self {
        Self { address, port }
    }

    /// Build a key from a socket address.
    pub fn from_socket(addr: &SocketAddr) -> Self {
        Self {
            address: canonical_address(addr.ip()),
            port: addr.port(),
        }
    }

    /// Build a key from an advertised descriptor.
    pub fn from_info(info: &PeerInfo) -> Self {
        Self {
            address: info.address.clone(),
            port: info.port,
        }
    }

    /// Rebuild the socket address this key dials to.
    pub fn socket_addr(&self) -> NetworkResult<SocketAddr> {
        crate::transport::socket_addr_of(&self.address, self.port)
    }
}

impl std::fmt::Display for PeerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match crate::transport::address_to_string(&self.address) {
            Ok(ip) => write!(f, "{}:{}", ip, self.port),
            Err(_) => write!(f, "{}:{}", hex::encode(&self.address), self.port),
        }
    }
}

/// Peer connection state.
///
/// Transitions move strictly forward within a connection:
/// `New -> VersionKnown -> FullyConnected`, terminating in
/// `Disconnected` (clean close) or `Banned` (policy close).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Connection attached, no version received yet.
    New,
    /// The peer's version message has been processed.
    VersionKnown,
    /// Both sides exchanged version and verack.
    FullyConnected,
    /// No live connection.
    Disconnected,
    /// Banned; reconnection refused until the ban expires.
    Banned,
}

/// The mutable per-peer record owned by the address book.
pub(crate) struct Peer {
    /// Advertised descriptor.
    pub info: PeerInfo,
    /// True iff we accepted the connection.
    pub inbound: bool,
    /// Connection state.
    pub state: PeerState,
    /// Protocol version from the peer's version message.
    pub version: Option<u16>,
    /// Accumulated misbehavior points for the current connection.
    pub misbehavior_score: u32,
    /// Ban deadline, while in force.
    pub banned_until: Option<Instant>,
    /// Send queue into the connection task; `None` when disconnected.
    pub sender: Option<mpsc::Sender<Message>>,
    /// Id of the live connection task.
    pub conn_id: Option<u64>,
    /// Bytes received on the current connection.
    pub bytes_in: Arc<AtomicU64>,
    /// Bytes sent on the current connection.
    pub bytes_out: Arc<AtomicU64>,
    /// When the current connection was attached.
    pub connected_at: Option<Instant>,
    /// Last time a frame arrived from this peer.
    pub last_seen: Instant,
    /// Initial-load latch for the current connection.
    pub loaded_tx: watch::Sender<bool>,
    /// Receiver side of the latch, cloned by waiters.
    pub loaded_rx: watch::Receiver<bool>,
}

impl Peer {
    /// Create a disconnected book record from an advertised descriptor.
    pub fn from_info(info: PeerInfo) -> Self {
        let (loaded_tx, loaded_rx) = watch::channel(false);
        Self {
            info,
            inbound: false,
            state: PeerState::Disconnected,
            version: None,
            misbehavior_score: 0,
            banned_until: None,
            sender: None,
            conn_id: None,
            bytes_in: Arc::new(AtomicU64::new(0)),
            bytes_out: Arc::new(AtomicU64::new(0)),
            connected_at: None,
            last_seen: Instant::now(),
            loaded_tx,
            loaded_rx,
        }
    }

    /// Attach a fresh connection. Resets the per-connection fields: the
    /// misbehavior score, version, byte counters, and load latch.
    pub fn attach(
        &mut self,
        inbound: bool,
        sender: mpsc::Sender<Message>,
        conn_id: u64,
        bytes_in: Arc<AtomicU64>,
        bytes_out: Arc<AtomicU64>,
    ) {
        let (loaded_tx, loaded_rx) = watch::channel(false);
        self.inbound = inbound;
        self.state = PeerState::New;
        self.version = None;
        self.misbehavior_score = 0;
        self.sender = Some(sender);
        self.conn_id = Some(conn_id);
        self.bytes_in = bytes_in;
        self.bytes_out = bytes_out;
        self.connected_at = Some(Instant::now());
        self.last_seen = Instant::now();
        self.loaded_tx = loaded_tx;
        self.loaded_rx = loaded_rx;
    }

    /// Drop the connection. Banned peers keep their terminal state.
    pub fn detach(&mut self) {
        self.sender = None;
        self.conn_id = None;
        self.connected_at = None;
        if self.state != PeerState::Banned {
            self.state = PeerState::Disconnected;
        }
    }

    /// True iff a live connection is attached.
    pub fn is_connected(&self) -> bool {
        self.sender.is_some()
    }

    /// True iff the ban is still in force.
    pub fn is_banned(&self) -> bool {
        match self.banned_until {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    /// Add misbehavior points; ban when the threshold is crossed.
    /// Returns `true` iff the peer is banned after the call.
    pub fn misbehave(&mut self, points: u32, ban_score: u32, ban_time: Duration) -> bool {
        if self.state == PeerState::Banned {
            return true;
        }
        self.misbehavior_score = self.misbehavior_score.saturating_add(points);
        if self.misbehavior_score >= ban_score {
            self.ban(ban_time);
            return true;
        }
        false
    }

    /// Move to the banned terminal state and close the connection.
    pub fn ban(&mut self, ban_time: Duration) {
        self.banned_until = Some(Instant::now() + ban_time);
        self.state = PeerState::Banned;
        self.sender = None;
    }

    /// Total bytes moved on the current connection.
    pub fn bytes_total(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed) + self.bytes_out.load(Ordering::Relaxed)
    }

    /// Signal that the initial sync exchange completed.
    pub fn mark_load_done(&self) {
        let _ = self.loaded_tx.send(true);
    }
}

/// A read-only copy of a peer record, for callers outside the book.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    /// Identity key.
    pub key: PeerKey,
    /// Advertised descriptor.
    pub info: PeerInfo,
    /// True iff we accepted the connection.
    pub inbound: bool,
    /// Connection state.
    pub state: PeerState,
    /// Protocol version, once known.
    pub version: Option<u16>,
    /// Accumulated misbehavior points.
    pub misbehavior_score: u32,
    /// Bytes received on the current connection.
    pub bytes_in: u64,
    /// Bytes sent on the current connection.
    pub bytes_out: u64,
    /// True iff the initial load latch fired.
    pub load_done: bool,
}

impl PeerSnapshot {
    pub(crate) fn of(key: &PeerKey, peer: &Peer) -> Self {
        Self {
            key: key.clone(),
            info: peer.info.clone(),
            inbound: peer.inbound,
            state: peer.state,
            version: peer.version,
            misbehavior_score: peer.misbehavior_score,
            bytes_in: peer.bytes_in.load(Ordering::Relaxed),
            bytes_out: peer.bytes_out.load(Ordering::Relaxed),
            load_done: *peer.loaded_rx.borrow(),
        }
    }

    /// True iff the handshake completed on this connection.
    pub fn fully_connected(&self) -> bool {
        self.state == PeerState::FullyConnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ux_wire::Capability;

    fn record() -> Peer {
        Peer::from_info(PeerInfo::new(vec![0u8; 16], 8223, Capability::node()))
    }

    #[test]
    fn test_misbehave_bans_at_threshold() {
        let mut peer = record();
        let ban_time = Duration::from_secs(60);

        for _ in 0..99 {
            assert!(!peer.misbehave(1, 100, ban_time));
        }
        assert_eq!(peer.misbehavior_score, 99);
        assert_ne!(peer.state, PeerState::Banned);

        assert!(peer.misbehave(1, 100, ban_time));
        assert_eq!(peer.state, PeerState::Banned);
        assert!(peer.is_banned());
    }

    #[test]
    fn test_score_monotone_and_reset_on_attach() {
        let mut peer = record();
        peer.misbehave(7, 100, Duration::from_secs(1));
        assert_eq!(peer.misbehavior_score, 7);

        let (tx, _rx) = mpsc::channel(1);
        peer.attach(
            false,
            tx,
            1,
            Arc::new(AtomicU64::new(0)),
            Arc::new(AtomicU64::new(0)),
        );
        assert_eq!(peer.misbehavior_score, 0);
        assert_eq!(peer.state, PeerState::New);
    }

    #[test]
    fn test_detach_keeps_ban() {
        let mut peer = record();
        peer.ban(Duration::from_secs(60));
        peer.detach();
        assert_eq!(peer.state, PeerState::Banned);
        assert!(!peer.is_connected());
    }

    #[test]
    fn test_key_socket_roundtrip() {
        let addr: SocketAddr = "10.1.2.3:8223".parse().unwrap();
        let key = PeerKey::from_socket(&addr);
        assert_eq!(key.socket_addr().unwrap(), addr);
        assert_eq!(key.to_string(), "10.1.2.3:8223");
    }
}
