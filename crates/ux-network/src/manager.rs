//! Peer manager: address book, connection registry, and message fan-out.
//!
//! The book maps canonical peer keys to runtime records. Each live
//! connection runs in its own task; decoded frames flow to the node as
//! `(peer key, message)` events on a single queue, so per-peer dispatch
//! order matches arrival order.

use crate::peer::Peer;
use crate::transport::{Connection, ConnectionSink, ConnectionStream};
use crate::{
    NetworkError, NetworkResult, PeerKey, PeerSnapshot, PeerState, Transport, ADDR_MAX_LENGTH,
    BAN_PEER_SCORE, BAN_PEER_TIME, CONNECTION_TIMEOUT, MAX_PEERS, MIN_PEERS, NETWORK_MAGIC,
    PEER_CONNECTION_LIFETIME, PEER_DEAD_TIME, PEER_HEARTBEAT_TIMEOUT, PEER_MAX_BYTES_COUNT,
    PEER_QUERY_TIMEOUT, PEER_RESTRICT_TIME, PROTOCOL_VERSION,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use ux_storage::{Column, Store};
use ux_wire::{Message, PeerInfo};

/// Tunable networking parameters. Defaults are the protocol constants;
/// tests shrink the timeouts.
#[derive(Debug, Clone)]
pub struct NetworkOptions {
    /// Network magic.
    pub magic: u32,
    /// Our protocol version.
    pub protocol_version: u16,
    /// Maximum live peers.
    pub max_peers: usize,
    /// Minimum live peers.
    pub min_peers: usize,
    /// Misbehavior score that triggers a ban.
    pub ban_score: u32,
    /// Ban duration.
    pub ban_time: Duration,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Silence after which a peer is considered dead.
    pub dead_time: Duration,
    /// Connection age at which a peer is recycled.
    pub connection_lifetime: Duration,
    /// Per-connection byte budget.
    pub max_bytes: u64,
    /// Redial restriction window.
    pub restrict_time: Duration,
    /// DNS bootstrap and initial-load timeout.
    pub query_timeout: Duration,
    /// Outbound TCP connect timeout.
    pub connect_timeout: Duration,
    /// Maximum peers per `addr` message.
    pub addr_max_length: usize,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            magic: NETWORK_MAGIC,
            protocol_version: PROTOCOL_VERSION,
            max_peers: MAX_PEERS,
            min_peers: MIN_PEERS,
            ban_score: BAN_PEER_SCORE,
            ban_time: BAN_PEER_TIME,
            heartbeat_interval: PEER_HEARTBEAT_TIMEOUT,
            dead_time: PEER_DEAD_TIME,
            connection_lifetime: PEER_CONNECTION_LIFETIME,
            max_bytes: PEER_MAX_BYTES_COUNT,
            restrict_time: PEER_RESTRICT_TIME,
            query_timeout: PEER_QUERY_TIMEOUT,
            connect_timeout: CONNECTION_TIMEOUT,
            addr_max_length: ADDR_MAX_LENGTH,
        }
    }
}

/// Events delivered to the node dispatcher.
#[derive(Debug)]
pub enum PeerEvent {
    /// A decoded frame arrived from a peer.
    Message {
        /// Current identity of the sending peer.
        key: PeerKey,
        /// The decoded message.
        message: Message,
    },
    /// A peer's connection task exited.
    Disconnected {
        /// Identity of the peer.
        key: PeerKey,
    },
}

/// Peerstate key under which the address book snapshot is persisted.
const BOOK_KEY: &[u8] = b"book";

/// Manages the address book and all live peer connections.
pub struct PeerManager {
    options: NetworkOptions,
    peers: DashMap<PeerKey, Peer>,
    /// Live connection id -> current peer key. Re-keyed in place when an
    /// inbound peer's identity is learned from its version message.
    connections: DashMap<u64, PeerKey>,
    /// Earliest redial time per peer.
    restrictions: DashMap<PeerKey, Instant>,
    next_conn_id: AtomicU64,
    event_tx: mpsc::Sender<PeerEvent>,
}

impl PeerManager {
    /// Create a manager and the event queue the node consumes.
    pub fn new(options: NetworkOptions) -> (Arc<Self>, mpsc::Receiver<PeerEvent>) {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let manager = Arc::new(Self {
            options,
            peers: DashMap::new(),
            connections: DashMap::new(),
            restrictions: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
            event_tx,
        });
        (manager, event_rx)
    }

    /// The configured options.
    pub fn options(&self) -> &NetworkOptions {
        &self.options
    }

    // ---- Address book ----

    /// Insert a gossiped descriptor, or merge its capabilities into an
    /// existing record. Never disturbs a live connection. Returns the
    /// record's key.
    pub fn add_peer_info(&self, info: PeerInfo) -> PeerKey {
        let key = PeerKey::from_info(&info);
        match self.peers.get_mut(&key) {
            Some(mut peer) => {
                peer.info.merge_capabilities(&info);
            }
            None => {
                self.peers.insert(key.clone(), Peer::from_info(info));
            }
        }
        key
    }

    /// Number of records in the book.
    pub fn book_len(&self) -> usize {
        self.peers.len()
    }

    /// Snapshot a single peer.
    pub fn snapshot(&self, key: &PeerKey) -> Option<PeerSnapshot> {
        self.peers.get(key).map(|p| PeerSnapshot::of(key, &p))
    }

    /// All peers whose descriptor matches the predicate.
    pub fn filter_peers<F: Fn(&PeerInfo) -> bool>(&self, predicate: F) -> Vec<PeerSnapshot> {
        self.peers
            .iter()
            .filter(|entry| predicate(&entry.info))
            .map(|entry| PeerSnapshot::of(entry.key(), &entry))
            .collect()
    }

    /// All peers.
    pub fn all_peers(&self) -> Vec<PeerSnapshot> {
        self.filter_peers(|_| true)
    }

    /// Descriptors of every peer with a learned identity, for `addr`
    /// gossip.
    pub fn known_infos(&self) -> Vec<PeerInfo> {
        self.peers
            .iter()
            .filter(|entry| !entry.info.capabilities.is_empty())
            .map(|entry| entry.info.clone())
            .collect()
    }

    /// Number of live connections.
    pub fn live_count(&self) -> usize {
        self.peers.iter().filter(|e| e.is_connected()).count()
    }

    /// Number of fully connected peers.
    pub fn fully_connected_count(&self) -> usize {
        self.peers
            .iter()
            .filter(|e| e.state == PeerState::FullyConnected)
            .count()
    }

    // ---- Connections ----

    /// Register an accepted inbound connection under its socket identity.
    /// The real identity is adopted later from the peer's version message.
    pub fn attach_inbound(self: &Arc<Self>, connection: Connection) -> PeerKey {
        let addr = connection.peer_addr();
        let key = PeerKey::from_socket(&addr);
        let info = PeerInfo {
            address: key.address.clone(),
            port: key.port,
            capabilities: Vec::new(),
        };
        self.peers
            .entry(key.clone())
            .or_insert_with(|| Peer::from_info(info));
        self.attach(&key, true, connection);
        key
    }

    /// Dial a book peer. Idempotent: a live connection is left alone and
    /// `Ok(false)` is returned. Refused while the peer is banned or
    /// inside its restriction window. Returns `Ok(true)` iff a fresh
    /// connection was attached.
    pub async fn connect(
        self: &Arc<Self>,
        transport: &Transport,
        key: &PeerKey,
    ) -> NetworkResult<bool> {
        {
            let peer = self
                .peers
                .get(key)
                .ok_or_else(|| NetworkError::PeerNotFound(key.to_string()))?;
            if peer.is_connected() {
                return Ok(false);
            }
            if peer.is_banned() {
                return Err(NetworkError::Banned(key.to_string()));
            }
        }
        if self.is_restricted(key) {
            return Err(NetworkError::Restricted(key.to_string()));
        }

        let addr = key.socket_addr()?;
        let connection = match transport.connect(addr).await {
            Ok(c) => c,
            Err(e) => {
                self.restrict(key);
                return Err(e);
            }
        };

        // A concurrent dial may have won the race
        if self.peers.get(key).map(|p| p.is_connected()).unwrap_or(false) {
            return Ok(false);
        }
        self.attach(key, false, connection);
        Ok(true)
    }

    fn attach(self: &Arc<Self>, key: &PeerKey, inbound: bool, connection: Connection) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel::<Message>(64);
        let (bytes_in, bytes_out) = connection.byte_counters();

        if let Some(mut peer) = self.peers.get_mut(key) {
            peer.attach(inbound, tx, conn_id, bytes_in, bytes_out);
        }
        self.connections.insert(conn_id, key.clone());

        info!(peer = %key, inbound, "Peer connection attached");
        self.spawn_peer_task(conn_id, connection, rx);
    }

    /// Re-key an inbound peer once its advertised identity is known.
    ///
    /// Fails with [`NetworkError::DuplicateConnection`] when another live
    /// connection already owns that identity; the caller is expected to
    /// send a reject and close the new connection.
    pub fn adopt_identity(&self, temp: &PeerKey, info: PeerInfo) -> NetworkResult<PeerKey> {
        let new_key = PeerKey::from_info(&info);
        if new_key == *temp {
            if let Some(mut peer) = self.peers.get_mut(temp) {
                let mut merged = info;
                merged.merge_capabilities(&peer.info);
                peer.info = merged;
            }
            return Ok(new_key);
        }

        if let Some(existing) = self.peers.get(&new_key) {
            if existing.is_connected() {
                return Err(NetworkError::DuplicateConnection(new_key.to_string()));
            }
        }

        let (_, mut peer) = self
            .peers
            .remove(temp)
            .ok_or_else(|| NetworkError::PeerNotFound(temp.to_string()))?;

        // Keep capabilities a stale book record may already hold
        let mut merged = info;
        if let Some((_, stale)) = self.peers.remove(&new_key) {
            merged.merge_capabilities(&stale.info);
        }
        peer.info = merged;

        if let Some(conn_id) = peer.conn_id {
            self.connections.insert(conn_id, new_key.clone());
        }
        self.peers.insert(new_key.clone(), peer);
        debug!(from = %temp, to = %new_key, "Adopted peer identity");
        Ok(new_key)
    }

    // ---- Messaging ----

    /// Enqueue a message to one peer. Per-peer send order is FIFO.
    pub async fn send(&self, key: &PeerKey, message: Message) -> NetworkResult<()> {
        let sender = self
            .peers
            .get(key)
            .and_then(|p| p.sender.clone())
            .ok_or(NetworkError::ConnectionClosed)?;
        sender
            .send(message)
            .await
            .map_err(|_| NetworkError::ConnectionClosed)
    }

    /// Send a message to every fully connected peer except the origin.
    pub async fn broadcast_except(&self, origin: &PeerKey, message: Message) {
        let targets: Vec<(PeerKey, mpsc::Sender<Message>)> = self
            .peers
            .iter()
            .filter(|e| e.state == PeerState::FullyConnected && e.key() != origin)
            .filter_map(|e| e.sender.clone().map(|s| (e.key().clone(), s)))
            .collect();
        for (key, sender) in targets {
            if sender.send(message.clone()).await.is_err() {
                debug!(peer = %key, "Broadcast target closed");
            }
        }
    }

    // ---- Policy ----

    /// Add misbehavior points. Returns `true` iff the peer is banned
    /// after the call.
    pub fn misbehave(&self, key: &PeerKey, points: u32) -> bool {
        let mut banned = false;
        if let Some(mut peer) = self.peers.get_mut(key) {
            banned = peer.misbehave(points, self.options.ban_score, self.options.ban_time);
            if banned {
                warn!(peer = %key, score = peer.misbehavior_score, "Peer banned for misbehavior");
            } else {
                debug!(peer = %key, score = peer.misbehavior_score, "Peer penalized");
            }
        }
        banned
    }

    /// Ban a peer immediately.
    pub fn ban(&self, key: &PeerKey) {
        if let Some(mut peer) = self.peers.get_mut(key) {
            peer.ban(self.options.ban_time);
            warn!(peer = %key, "Peer banned");
        }
    }

    /// Cleanly close a peer's connection.
    pub fn disconnect(&self, key: &PeerKey) {
        if let Some(mut peer) = self.peers.get_mut(key) {
            peer.sender = None;
        }
    }

    /// Start a redial restriction window for a peer.
    pub fn restrict(&self, key: &PeerKey) {
        self.restrictions
            .insert(key.clone(), Instant::now() + self.options.restrict_time);
    }

    /// True iff the peer is inside its restriction window.
    pub fn is_restricted(&self, key: &PeerKey) -> bool {
        match self.restrictions.get(key) {
            Some(until) => {
                if Instant::now() < *until {
                    return true;
                }
                drop(until);
                self.restrictions.remove(key);
                false
            }
            None => false,
        }
    }

    // ---- Handshake bookkeeping (driven by the node) ----

    /// The peer's reported protocol version, once recorded.
    pub fn version_of(&self, key: &PeerKey) -> Option<u16> {
        self.peers.get(key).and_then(|p| p.version)
    }

    /// Record the peer's version and move it to `VersionKnown`.
    pub fn record_version(&self, key: &PeerKey, version: u16) {
        if let Some(mut peer) = self.peers.get_mut(key) {
            peer.version = Some(version);
            if peer.state == PeerState::New {
                peer.state = PeerState::VersionKnown;
            }
        }
    }

    /// Complete the handshake. Requires the version to be known.
    /// Returns `true` iff the peer is now fully connected.
    pub fn set_fully_connected(&self, key: &PeerKey) -> bool {
        if let Some(mut peer) = self.peers.get_mut(key) {
            if peer.version.is_some() && peer.state == PeerState::VersionKnown {
                peer.state = PeerState::FullyConnected;
                return true;
            }
            return peer.state == PeerState::FullyConnected;
        }
        false
    }

    /// True iff the handshake completed.
    pub fn is_fully_connected(&self, key: &PeerKey) -> bool {
        self.peers
            .get(key)
            .map(|p| p.state == PeerState::FullyConnected)
            .unwrap_or(false)
    }

    /// True iff we accepted this peer's connection.
    pub fn is_inbound(&self, key: &PeerKey) -> bool {
        self.peers.get(key).map(|p| p.inbound).unwrap_or(false)
    }

    /// Signal that the initial sync exchange with a peer completed.
    pub fn mark_load_done(&self, key: &PeerKey) {
        if let Some(peer) = self.peers.get(key) {
            peer.mark_load_done();
        }
    }

    /// Wait until the peer's initial load completes or the query timeout
    /// elapses. Returns `true` iff the load completed.
    pub async fn loaded(&self, key: &PeerKey) -> bool {
        let mut rx = match self.peers.get(key) {
            Some(peer) => peer.loaded_rx.clone(),
            None => return false,
        };
        if *rx.borrow() {
            return true;
        }
        tokio::time::timeout(self.options.query_timeout, async move {
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false)
    }

    // ---- Maintenance ----

    /// Peers whose connection exceeded its lifetime or byte budget.
    pub fn recycle_candidates(&self) -> Vec<PeerKey> {
        self.peers
            .iter()
            .filter(|e| e.is_connected())
            .filter(|e| {
                let over_age = e
                    .connected_at
                    .map(|t| t.elapsed() >= self.options.connection_lifetime)
                    .unwrap_or(false);
                over_age || e.bytes_total() >= self.options.max_bytes
            })
            .map(|e| e.key().clone())
            .collect()
    }

    /// Dialable peers, most recently seen first: disconnected, identity
    /// known, not banned, not restricted.
    pub fn dial_candidates(&self, limit: usize) -> Vec<PeerKey> {
        let mut candidates: Vec<(Instant, PeerKey)> = self
            .peers
            .iter()
            .filter(|e| !e.is_connected() && !e.is_banned())
            .filter(|e| !e.info.capabilities.is_empty())
            .map(|e| (e.last_seen, e.key().clone()))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        candidates
            .into_iter()
            .map(|(_, key)| key)
            .filter(|key| !self.is_restricted(key))
            .take(limit)
            .collect()
    }

    /// Drop disconnected records that never revealed an identity, such
    /// as inbound connections that died before their version message.
    /// Runs on the backup timer. Banned records are kept so the ban
    /// stays enforceable. Returns the number pruned.
    pub fn prune_stale(&self) -> usize {
        let before = self.peers.len();
        self.peers.retain(|_, peer| {
            peer.is_connected()
                || peer.state == PeerState::Banned
                || !peer.info.capabilities.is_empty()
        });
        before - self.peers.len()
    }

    /// Persist the address book snapshot. Returns the number of records
    /// written.
    pub fn persist_book(&self, store: &dyn Store) -> NetworkResult<usize> {
        let infos = self.known_infos();
        let bytes = serde_json::to_vec(&infos)
            .map_err(|e| NetworkError::InvalidAddress(format!("book snapshot: {}", e)))?;
        store.put(Column::Peerstate, BOOK_KEY, &bytes)?;
        debug!(count = infos.len(), "Address book persisted");
        Ok(infos.len())
    }

    /// Load a persisted address book snapshot into the book.
    pub fn load_book(&self, store: &dyn Store) -> NetworkResult<usize> {
        let Some(bytes) = store.get(Column::Peerstate, BOOK_KEY)? else {
            return Ok(0);
        };
        let infos: Vec<PeerInfo> = serde_json::from_slice(&bytes)
            .map_err(|e| NetworkError::InvalidAddress(format!("book snapshot: {}", e)))?;
        let count = infos.len();
        for info in infos {
            self.add_peer_info(info);
        }
        Ok(count)
    }

    // ---- Connection task ----

    fn key_of(&self, conn_id: u64) -> Option<PeerKey> {
        self.connections.get(&conn_id).map(|k| k.clone())
    }

    fn note_seen(&self, conn_id: u64) {
        if let Some(key) = self.key_of(conn_id) {
            if let Some(mut peer) = self.peers.get_mut(&key) {
                peer.last_seen = Instant::now();
            }
        }
    }

    async fn emit_message(&self, conn_id: u64, message: Message) -> Result<(), ()> {
        let Some(key) = self.key_of(conn_id) else {
            return Err(());
        };
        self.event_tx
            .send(PeerEvent::Message { key, message })
            .await
            .map_err(|_| ())
    }

    fn misbehave_conn(&self, conn_id: u64, points: u32) {
        if let Some(key) = self.key_of(conn_id) {
            self.misbehave(&key, points);
        }
    }

    async fn on_task_exit(&self, conn_id: u64) {
        let Some((_, key)) = self.connections.remove(&conn_id) else {
            return;
        };
        if let Some(mut peer) = self.peers.get_mut(&key) {
            if peer.conn_id == Some(conn_id) {
                peer.detach();
            }
        }
        self.restrict(&key);
        info!(peer = %key, "Peer connection closed");
        let _ = self.event_tx.send(PeerEvent::Disconnected { key }).await;
    }

    fn spawn_peer_task(
        self: &Arc<Self>,
        conn_id: u64,
        connection: Connection,
        mut rx: mpsc::Receiver<Message>,
    ) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let (mut sink, mut stream): (ConnectionSink, ConnectionStream) = connection.split();
            let heartbeat_start = tokio::time::Instant::now() + manager.options.heartbeat_interval;
            let mut heartbeat =
                tokio::time::interval_at(heartbeat_start, manager.options.heartbeat_interval);
            heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_frame = Instant::now();

            loop {
                tokio::select! {
                    frame = stream.next() => match frame {
                        Some(Ok(Ok(message))) => {
                            last_frame = Instant::now();
                            manager.note_seen(conn_id);
                            if manager.emit_message(conn_id, message).await.is_err() {
                                break;
                            }
                        }
                        // Payload failed to decode; the frame itself was
                        // consumed cleanly
                        Some(Ok(Err(e))) => {
                            debug!(conn_id, error = %e, "Undecodable frame");
                            last_frame = Instant::now();
                            manager.misbehave_conn(conn_id, 1);
                        }
                        Some(Err(e)) => {
                            warn!(conn_id, error = %e, "Fatal receive error");
                            break;
                        }
                        None => break,
                    },
                    outbound = rx.recv() => match outbound {
                        Some(message) => {
                            if sink.send(message).await.is_err() {
                                break;
                            }
                        }
                        // Sender dropped: disconnect or ban
                        None => break,
                    },
                    _ = heartbeat.tick() => {
                        if last_frame.elapsed() >= manager.options.dead_time {
                            warn!(conn_id, "Peer silent past dead time, disconnecting");
                            break;
                        }
                        if sink.send(Message::Ping).await.is_err() {
                            break;
                        }
                    }
                }
            }

            manager.on_task_exit(conn_id).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ux_storage::MemoryStore;
    use ux_wire::Capability;

    fn info(last: u8, port: u16) -> PeerInfo {
        let mut address = vec![0u8; 16];
        address[10] = 0xff;
        address[11] = 0xff;
        address[12] = 10;
        address[15] = last;
        PeerInfo::new(address, port, Capability::node())
    }

    fn manager() -> Arc<PeerManager> {
        PeerManager::new(NetworkOptions::default()).0
    }

    #[test]
    fn test_add_peer_info_idempotent() {
        let pm = manager();

        let key = pm.add_peer_info(info(1, 8223));
        assert_eq!(pm.book_len(), 1);

        // Same identity again: book size unchanged
        let key2 = pm.add_peer_info(info(1, 8223));
        assert_eq!(key, key2);
        assert_eq!(pm.book_len(), 1);

        // Capability update merges without duplication
        let mut update = info(1, 8223);
        update.capabilities = vec![Capability::witness(vec![7u8; 33])];
        pm.add_peer_info(update);
        let snapshot = pm.snapshot(&key).unwrap();
        assert_eq!(snapshot.info.capabilities.len(), 2);
    }

    #[test]
    fn test_filter_peers_by_capability() {
        let pm = manager();
        pm.add_peer_info(info(1, 8223));
        let mut witness = info(2, 8223);
        witness.capabilities = vec![Capability::witness(vec![9u8; 33])];
        pm.add_peer_info(witness);

        let witnesses = pm.filter_peers(|i| i.has_service(ux_wire::Service::Witness));
        assert_eq!(witnesses.len(), 1);
        assert_eq!(pm.all_peers().len(), 2);
    }

    #[test]
    fn test_misbehave_to_ban() {
        let pm = manager();
        let key = pm.add_peer_info(info(1, 8223));

        assert!(!pm.misbehave(&key, BAN_PEER_SCORE - 1));
        assert!(pm.misbehave(&key, 1));

        let snapshot = pm.snapshot(&key).unwrap();
        assert_eq!(snapshot.state, PeerState::Banned);

        // Banned peers are not dial candidates
        assert!(pm.dial_candidates(10).is_empty());
    }

    #[test]
    fn test_restriction_window() {
        let pm = manager();
        let key = pm.add_peer_info(info(1, 8223));

        assert!(!pm.is_restricted(&key));
        pm.restrict(&key);
        assert!(pm.is_restricted(&key));
        assert!(pm.dial_candidates(10).is_empty());
    }

    #[test]
    fn test_dial_candidates_most_recent_first() {
        let pm = manager();
        let old = pm.add_peer_info(info(1, 8223));
        let fresh = pm.add_peer_info(info(2, 8223));

        // Age the first record
        pm.peers.get_mut(&old).unwrap().last_seen = Instant::now() - Duration::from_secs(60);

        let candidates = pm.dial_candidates(10);
        assert_eq!(candidates, vec![fresh, old]);
    }

    #[test]
    fn test_persist_and_load_book() {
        let pm = manager();
        pm.add_peer_info(info(1, 8223));
        pm.add_peer_info(info(2, 8224));

        let store = MemoryStore::new();
        assert_eq!(pm.persist_book(&store).unwrap(), 2);

        let (restored, _rx) = PeerManager::new(NetworkOptions::default());
        assert_eq!(restored.load_book(&store).unwrap(), 2);
        assert_eq!(restored.book_len(), 2);
    }

    #[test]
    fn test_record_version_then_fully_connected() {
        let pm = manager();
        let key = pm.add_peer_info(info(1, 8223));

        // Without a connection the record sits in Disconnected; simulate
        // an attached state machine
        pm.peers.get_mut(&key).unwrap().state = PeerState::New;

        assert!(!pm.set_fully_connected(&key));
        pm.record_version(&key, PROTOCOL_VERSION);
        assert_eq!(pm.version_of(&key), Some(PROTOCOL_VERSION));
        assert!(pm.set_fully_connected(&key));
        assert!(pm.is_fully_connected(&key));
    }
}
