//! Node implementation.
//!
//! The node owns the transport and the peer manager, consumes the
//! manager's event queue, and drives the handshake protocol, address
//! gossip, transaction relay, and the peer watchdog.

use crate::config::NodeConfig;
use crate::validate::{validate_tx, TxError};
use dashmap::DashSet;
use futures::future::join_all;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use ux_crypto::KeyPair;
use ux_mempool::{Mempool, MempoolError};
use ux_network::{
    canonical_address, resolve_seeds, Connection, NetworkError, NetworkOptions, NetworkResult,
    PeerEvent, PeerKey, PeerManager, Resolver, Transport, PEERMANAGER_BACKUP_TIMEOUT,
    PEER_RECONNECT_INTERVAL, PEER_TICK_TIMEOUT,
};
use ux_storage::{Column, Store};
use ux_wire::{
    AddrPayload, Block, Capability, InvType, Inventory, InventoryVector, Message, PeerInfo,
    RejectPayload, Service, TxMessage, VersionPayload, WitnessMessage, REJECT_DUPLICATE,
};

/// Milliseconds since the epoch.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The main node struct coordinating all components.
pub struct Node {
    name: String,
    options: NetworkOptions,
    /// Connection nonce for self-connection detection.
    nonce: u64,
    our_key: PeerKey,
    our_info: PeerInfo,
    listen_addr: SocketAddr,
    transport: Transport,
    manager: Arc<PeerManager>,
    mempool: Arc<Mempool>,
    store: Arc<dyn Store>,
    resolver: Arc<dyn Resolver>,
    dns_seeds: Vec<String>,
    static_seeds: Vec<SocketAddr>,
    /// Peers with a dial in flight, to keep the watchdog from stacking
    /// attempts.
    dialing: DashSet<PeerKey>,
    /// Witness key, when this node participates in consensus.
    witness_key: Option<KeyPair>,
    /// Outlet for witness round messages; the consensus machine reads
    /// the other end.
    witness_tx: mpsc::Sender<(PeerKey, Message)>,
    witness_rx: Mutex<Option<mpsc::Receiver<(PeerKey, Message)>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Node {
    /// Start a node: bind the listener and spawn the dispatcher. The
    /// returned node is live but has not bootstrapped yet.
    pub async fn start(
        config: NodeConfig,
        options: NetworkOptions,
        store: Arc<dyn Store>,
        resolver: Arc<dyn Resolver>,
    ) -> NetworkResult<Arc<Self>> {
        let mut nonce_bytes = [0u8; 8];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = u64::from_le_bytes(nonce_bytes);

        let (manager, event_rx) = PeerManager::new(options.clone());
        match manager.load_book(store.as_ref()) {
            Ok(count) if count > 0 => info!(count, "Restored address book"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to restore address book"),
        }

        let transport = Transport::new(options.magic, options.connect_timeout);
        let bind: SocketAddr = config
            .network
            .bind_address
            .parse()
            .map_err(|_| NetworkError::InvalidAddress(config.network.bind_address.clone()))?;
        let (accept_tx, accept_rx) = mpsc::channel(16);
        let listen_addr = transport.listen(bind, accept_tx).await?;

        let declared_ip = match &config.network.declared_address {
            Some(declared) => declared
                .parse()
                .map_err(|_| NetworkError::InvalidAddress(declared.clone()))?,
            None => listen_addr.ip(),
        };
        let our_key = PeerKey::new(canonical_address(declared_ip), listen_addr.port());

        let witness_key = match (config.witness.enabled, &config.witness.key_file) {
            (true, Some(path)) => {
                let raw = std::fs::read_to_string(path)?;
                let bytes = hex::decode(raw.trim())
                    .map_err(|e| NetworkError::InvalidAddress(format!("witness key: {}", e)))?;
                let pair = KeyPair::from_secret_bytes(&bytes)
                    .map_err(|e| NetworkError::InvalidAddress(format!("witness key: {}", e)))?;
                info!("Witness key loaded");
                Some(pair)
            }
            (true, None) => {
                warn!("Witness enabled without a key file; generating an ephemeral key");
                Some(KeyPair::generate())
            }
            _ => None,
        };

        let mut capabilities = vec![Capability::node()];
        if let Some(pair) = &witness_key {
            capabilities.push(Capability::witness(pair.public_key_bytes().to_vec()));
        }
        let our_info = PeerInfo {
            address: our_key.address.clone(),
            port: our_key.port,
            capabilities,
        };

        let static_seeds = config
            .network
            .static_seeds
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();

        let (witness_tx, witness_rx) = mpsc::channel(256);
        let (shutdown_tx, _) = watch::channel(false);

        let node = Arc::new(Self {
            name: config.node_name,
            options,
            nonce,
            our_key,
            our_info,
            listen_addr,
            transport,
            manager,
            mempool: Arc::new(Mempool::with_defaults()),
            store,
            resolver,
            dns_seeds: config.network.dns_seeds,
            static_seeds,
            dialing: DashSet::new(),
            witness_key,
            witness_tx,
            witness_rx: Mutex::new(Some(witness_rx)),
            shutdown_tx,
        });

        info!(name = %node.name, addr = %listen_addr, nonce = node.nonce, "Node started");

        let dispatcher = Arc::clone(&node);
        tokio::spawn(dispatcher.dispatch_loop(event_rx, accept_rx));

        Ok(node)
    }

    /// The actual listen address.
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Our identity key in address books.
    pub fn our_key(&self) -> &PeerKey {
        &self.our_key
    }

    /// Our connection nonce.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The peer manager.
    pub fn manager(&self) -> &Arc<PeerManager> {
        &self.manager
    }

    /// The mempool.
    pub fn mempool(&self) -> &Arc<Mempool> {
        &self.mempool
    }

    /// The persistent store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Take the witness message outlet. The consensus round machine
    /// consumes `(peer, message)` pairs from it.
    pub fn witness_events(&self) -> Option<mpsc::Receiver<(PeerKey, Message)>> {
        self.witness_rx.lock().take()
    }

    /// Stop the dispatcher.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    // ---- Bootstrap ----

    /// Bootstrap: resolve seeds, fill the book, dial the best peers, and
    /// wait for their initial load (bounded by the query timeout each).
    pub async fn bootstrap(self: &Arc<Self>) {
        let resolved = resolve_seeds(
            self.resolver.as_ref(),
            &self.dns_seeds,
            self.options.query_timeout,
        )
        .await;
        info!(resolved = resolved.len(), "Seed resolution finished");

        for addr in resolved.iter().chain(self.static_seeds.iter()) {
            self.manager.add_peer_info(PeerInfo::new(
                canonical_address(addr.ip()),
                addr.port(),
                Capability::node(),
            ));
        }

        // Prefer witnesses when any are known
        let mut best = self
            .manager
            .filter_peers(|info| info.has_service(Service::Witness));
        if best.is_empty() {
            best = self
                .manager
                .filter_peers(|info| info.has_service(Service::Node));
        }

        let mut dialed = Vec::new();
        for snapshot in best.into_iter().take(self.options.max_peers) {
            let key = snapshot.key;
            if key == self.our_key {
                continue;
            }
            match self.manager.connect(&self.transport, &key).await {
                Ok(true) => {
                    if let Err(e) = self.push_version(&key).await {
                        debug!(peer = %key, error = %e, "Version push failed");
                        continue;
                    }
                    dialed.push(key);
                }
                Ok(false) => dialed.push(key),
                Err(e) => debug!(peer = %key, error = %e, "Bootstrap dial failed"),
            }
        }

        join_all(dialed.iter().map(|key| self.manager.loaded(key))).await;
        info!(
            live = self.manager.live_count(),
            book = self.manager.book_len(),
            "Bootstrap finished"
        );
    }

    /// Add an address to the book and dial it.
    pub async fn connect_to(self: &Arc<Self>, addr: SocketAddr) -> NetworkResult<PeerKey> {
        let key = self.manager.add_peer_info(PeerInfo::new(
            canonical_address(addr.ip()),
            addr.port(),
            Capability::node(),
        ));
        if self.manager.connect(&self.transport, &key).await? {
            self.push_version(&key).await?;
        }
        Ok(key)
    }

    async fn push_version(&self, key: &PeerKey) -> NetworkResult<()> {
        let payload = VersionPayload {
            protocol_version: self.options.protocol_version,
            nonce: self.nonce,
            timestamp: now_millis(),
            peer_info: self.our_info.clone(),
        };
        self.manager.send(key, Message::Version(payload)).await
    }

    // ---- Dispatcher ----

    async fn dispatch_loop(
        self: Arc<Self>,
        mut event_rx: mpsc::Receiver<PeerEvent>,
        mut accept_rx: mpsc::Receiver<Connection>,
    ) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let mut tick = tokio::time::interval(PEER_TICK_TIMEOUT);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut reconnect = tokio::time::interval(PEER_RECONNECT_INTERVAL);
        reconnect.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let backup_start = tokio::time::Instant::now() + PEERMANAGER_BACKUP_TIMEOUT;
        let mut backup = tokio::time::interval_at(backup_start, PEERMANAGER_BACKUP_TIMEOUT);
        backup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                Some(connection) = accept_rx.recv() => {
                    self.handle_inbound(connection);
                }
                Some(event) = event_rx.recv() => match event {
                    PeerEvent::Message { key, message } => {
                        self.handle_message(key, message).await;
                    }
                    PeerEvent::Disconnected { key } => {
                        debug!(peer = %key, "Peer disconnected");
                    }
                },
                _ = tick.tick() => self.watchdog_tick(),
                _ = reconnect.tick() => self.reconnect_tick(),
                _ = backup.tick() => self.backup_tick(),
            }
        }

        info!(name = %self.name, "Node dispatcher stopped");
    }

    fn handle_inbound(self: &Arc<Self>, connection: Connection) {
        if self.manager.live_count() >= self.options.max_peers {
            warn!(addr = %connection.peer_addr(), "At max peers, dropping inbound connection");
            return;
        }
        let key = self.manager.attach_inbound(connection);
        debug!(peer = %key, "Inbound peer attached");
    }

    // ---- Message dispatch ----

    async fn handle_message(self: &Arc<Self>, key: PeerKey, message: Message) {
        match message {
            Message::Version(payload) => self.handle_version(key, payload).await,
            Message::VerAck => self.handle_verack(key).await,
            Message::Reject(payload) => {
                // Ambiguous between collision and malice
                warn!(peer = %key, code = payload.code, reason = %payload.reason, "Peer rejected us");
                self.manager.misbehave(&key, 1);
            }
            other => {
                if !self.manager.is_fully_connected(&key) {
                    debug!(peer = %key, kind = other.command(), "Message before handshake");
                    self.manager.misbehave(&key, 1);
                    return;
                }
                match other {
                    Message::GetAddr => self.handle_getaddr(&key).await,
                    Message::Addr(payload) => self.handle_addr(&key, payload),
                    Message::Tx(msg) => self.handle_tx(&key, msg).await,
                    Message::Inv(inventory) => self.handle_inv(&key, inventory).await,
                    Message::GetData(inventory) => self.handle_getdata(&key, inventory).await,
                    Message::GetBlocks(known) => self.handle_getblocks(&key, known).await,
                    Message::Block(block) => self.handle_block(&key, block).await,
                    Message::Ping => {
                        let _ = self.manager.send(&key, Message::Pong).await;
                    }
                    Message::Pong => {}
                    witness @ (Message::WitnessHandshake(_)
                    | Message::WitnessNextRound(_)
                    | Message::WitnessExpose(_)
                    | Message::WitnessBlock(_)
                    | Message::WitnessBlockVote(_)) => {
                        self.handle_witness(&key, witness);
                    }
                    Message::Version(_) | Message::VerAck | Message::Reject(_) => unreachable!(),
                }
            }
        }
    }

    // ---- Handshake ----

    async fn handle_version(self: &Arc<Self>, key: PeerKey, payload: VersionPayload) {
        // Connected to ourselves
        if payload.nonce == self.nonce {
            warn!(peer = %key, "Self-connection detected, banning");
            self.manager.ban(&key);
            return;
        }

        if payload.protocol_version < self.options.protocol_version {
            info!(
                peer = %key,
                theirs = payload.protocol_version,
                ours = self.options.protocol_version,
                "Incompatible protocol, disconnecting"
            );
            self.manager.disconnect(&key);
            return;
        }

        if self.manager.version_of(&key).is_some() {
            self.manager.misbehave(&key, 1);
            return;
        }

        let inbound = self.manager.is_inbound(&key);
        let key = if inbound {
            // Learn the peer's real identity and re-bind handlers
            match self.manager.adopt_identity(&key, payload.peer_info.clone()) {
                Ok(new_key) => new_key,
                Err(NetworkError::DuplicateConnection(_)) => {
                    info!(peer = %key, "Duplicate connection, rejecting");
                    let reject = Message::Reject(RejectPayload {
                        code: REJECT_DUPLICATE,
                        reason: "Duplicate connection detected".to_string(),
                    });
                    let _ = self.manager.send(&key, reject).await;
                    self.manager.disconnect(&key);
                    return;
                }
                Err(e) => {
                    warn!(peer = %key, error = %e, "Identity adoption failed");
                    return;
                }
            }
        } else {
            // Merge advertised capabilities into the book record
            self.manager.add_peer_info(payload.peer_info.clone());
            key
        };

        self.manager.record_version(&key, payload.protocol_version);

        if inbound {
            if let Err(e) = self.push_version(&key).await {
                debug!(peer = %key, error = %e, "Version reply failed");
                return;
            }
        }
        let _ = self.manager.send(&key, Message::VerAck).await;
    }

    async fn handle_verack(self: &Arc<Self>, key: PeerKey) {
        if self.manager.version_of(&key).is_some() && self.manager.set_fully_connected(&key) {
            info!(peer = %key, "Handshake complete");
        }
        if !self.manager.is_inbound(&key) {
            // Solicit the peer's address book
            let _ = self.manager.send(&key, Message::GetAddr).await;
        }
    }

    // ---- Address gossip ----

    async fn handle_getaddr(&self, key: &PeerKey) {
        let infos = self.manager.known_infos();
        if infos.is_empty() {
            let _ = self
                .manager
                .send(key, Message::Addr(AddrPayload { peers: Vec::new() }))
                .await;
            return;
        }
        for chunk in infos.chunks(self.options.addr_max_length) {
            let message = Message::Addr(AddrPayload {
                peers: chunk.to_vec(),
            });
            if self.manager.send(key, message).await.is_err() {
                break;
            }
        }
    }

    fn handle_addr(&self, key: &PeerKey, payload: AddrPayload) {
        for info in payload.peers {
            if PeerKey::from_info(&info) == self.our_key {
                continue;
            }
            self.manager.add_peer_info(info);
        }
        self.manager.mark_load_done(key);
    }

    // ---- Transaction relay ----

    async fn handle_tx(self: &Arc<Self>, key: &PeerKey, msg: TxMessage) {
        let (sender, committed_nonce) =
            match validate_tx(self.store.as_ref(), &self.mempool, &msg) {
                Ok(ok) => ok,
                Err(TxError::Storage(e)) => {
                    // Local failure; the peer is not at fault
                    warn!(error = %e, "Storage failure during tx validation");
                    return;
                }
                Err(e) => {
                    debug!(peer = %key, error = %e, "Invalid transaction");
                    self.manager.misbehave(key, 1);
                    return;
                }
            };

        let hash = msg.tx.hash();
        match self
            .mempool
            .accept(msg.tx, msg.auth, sender, committed_nonce)
        {
            Ok(true) => {
                debug!(tx = %hex::encode(hash), "Transaction admitted, relaying");
                let inv = Message::Inv(Inventory(vec![InventoryVector::tx(hash)]));
                self.manager.broadcast_except(key, inv).await;
            }
            Ok(false) => {}
            Err(MempoolError::BadNonce { .. }) => {
                self.manager.misbehave(key, 1);
            }
            Err(e @ MempoolError::Full { .. }) => {
                // Local resource pressure; not the peer's fault
                warn!(error = %e, "Mempool rejected transaction");
            }
        }
    }

    // ---- Inventory ----

    async fn handle_inv(&self, key: &PeerKey, inventory: Inventory) {
        let mut wanted = Vec::new();
        for item in inventory.0 {
            let known = match item.inv_type {
                InvType::Tx => self.mempool.contains(&item.hash),
                InvType::Block => self
                    .store
                    .contains(Column::Blockstate, &item.hash)
                    .unwrap_or(false),
            };
            if !known {
                wanted.push(item);
            }
        }
        if !wanted.is_empty() {
            let _ = self
                .manager
                .send(key, Message::GetData(Inventory(wanted)))
                .await;
        }
    }

    async fn handle_getdata(&self, key: &PeerKey, inventory: Inventory) {
        for item in inventory.0 {
            match item.inv_type {
                InvType::Tx => {
                    if let Some(msg) = self.mempool.get_message(&item.hash) {
                        let _ = self.manager.send(key, Message::Tx(msg)).await;
                    }
                }
                InvType::Block => match self.store.get(Column::Blockstate, &item.hash) {
                    Ok(Some(bytes)) => match Block::from_bytes(&bytes) {
                        Ok(block) => {
                            let _ = self.manager.send(key, Message::Block(block)).await;
                        }
                        Err(e) => warn!(error = %e, "Stored block failed to decode"),
                    },
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Block lookup failed"),
                },
            }
        }
    }

    async fn handle_getblocks(&self, key: &PeerKey, known: Vec<[u8; 32]>) {
        let stored = match self.store.iter_prefix(Column::Blockstate, b"") {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Blockstate scan failed");
                return;
            }
        };
        let items: Vec<InventoryVector> = stored
            .into_iter()
            .filter_map(|(stored_key, _)| <[u8; 32]>::try_from(stored_key.as_slice()).ok())
            .filter(|hash| !known.contains(hash))
            .take(500)
            .map(InventoryVector::block)
            .collect();
        if !items.is_empty() {
            let _ = self.manager.send(key, Message::Inv(Inventory(items))).await;
        }
    }

    async fn handle_block(self: &Arc<Self>, key: &PeerKey, block: Block) {
        let hash = block.hash();
        match self.store.contains(Column::Blockstate, &hash) {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Blockstate lookup failed");
                return;
            }
        }

        // Persist the block and index its transactions; chain selection
        // is the consensus machine's concern
        let mut batch = ux_storage::WriteBatch::new();
        batch.put(Column::Blockstate, hash.to_vec(), block.to_bytes());
        let tx_hashes: Vec<[u8; 32]> = block.txns.iter().map(|t| t.hash()).collect();
        for tx_hash in &tx_hashes {
            batch.put(Column::TxIndex, tx_hash.to_vec(), hash.to_vec());
        }
        if let Err(e) = self.store.write_batch(batch) {
            warn!(error = %e, "Failed to persist block");
            return;
        }

        self.mempool.remove_committed(&tx_hashes);
        info!(
            block = %hex::encode(hash),
            txns = tx_hashes.len(),
            height = block.header.height,
            "Block stored"
        );

        let inv = Message::Inv(Inventory(vec![InventoryVector::block(hash)]));
        self.manager.broadcast_except(key, inv).await;
    }

    // ---- Witness boundary ----

    fn handle_witness(&self, key: &PeerKey, message: Message) {
        if self.witness_key.is_none() {
            debug!(peer = %key, kind = message.command(), "Witness message ignored, not a witness");
            return;
        }
        if self.witness_tx.try_send((key.clone(), message)).is_err() {
            warn!(peer = %key, "Witness queue full, dropping round message");
        }
    }

    /// Sign a witness round payload with our witness key.
    pub fn sign_witness_message(&self, mut message: WitnessMessage) -> Option<WitnessMessage> {
        let pair = self.witness_key.as_ref()?;
        let digest = ux_crypto::keccak256(&message.data);
        message.auth = Some(ux_wire::MessageAuth {
            signature: ux_crypto::sign(&digest, pair.secret_key()),
            public_key: pair.public_key_bytes(),
        });
        Some(message)
    }

    // ---- Watchdog ----

    fn watchdog_tick(self: &Arc<Self>) {
        for key in self.manager.recycle_candidates() {
            info!(peer = %key, "Recycling connection");
            self.manager.disconnect(&key);
        }

        let live = self.manager.live_count();
        if live < self.options.max_peers {
            for key in self.manager.dial_candidates(self.options.max_peers - live) {
                self.dial(key);
            }
        }
    }

    fn reconnect_tick(self: &Arc<Self>) {
        let live = self.manager.live_count();
        if live >= self.options.min_peers {
            return;
        }
        for key in self.manager.dial_candidates(self.options.max_peers - live) {
            self.dial(key);
        }
    }

    fn backup_tick(&self) {
        let pruned = self.manager.prune_stale();
        if pruned > 0 {
            debug!(pruned, "Pruned stale address book records");
        }
        if let Err(e) = self.manager.persist_book(self.store.as_ref()) {
            warn!(error = %e, "Address book backup failed");
        }
        self.mempool.sweep_expired();
    }

    fn dial(self: &Arc<Self>, key: PeerKey) {
        if key == self.our_key {
            return;
        }
        if !self.dialing.insert(key.clone()) {
            return;
        }
        let node = Arc::clone(self);
        tokio::spawn(async move {
            match node.manager.connect(&node.transport, &key).await {
                Ok(true) => {
                    if let Err(e) = node.push_version(&key).await {
                        debug!(peer = %key, error = %e, "Version push failed");
                    }
                }
                Ok(false) => {}
                Err(e) => debug!(peer = %key, error = %e, "Dial failed"),
            }
            node.dialing.remove(&key);
        });
    }
}
