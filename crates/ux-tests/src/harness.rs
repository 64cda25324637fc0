//! Test harness: loopback nodes, stub resolvers, and a scripted peer.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use ux_crypto::KeyPair;
use ux_network::{
    canonical_address, Connection, NetworkOptions, NetworkResult, PeerKey, Resolver, Transport,
    NETWORK_MAGIC, PROTOCOL_VERSION,
};
use ux_node::{config::NodeConfig, node::Node};
use ux_storage::{put_account, Account, Database};
use ux_wire::{
    Capability, Message, MessageAuth, PeerInfo, Transaction, TransactionPayload, TxMessage,
    TxOutput, VersionPayload,
};

/// Resolver stub with fixed entries; unknown names fail, names listed in
/// `hanging` never resolve.
#[derive(Default)]
pub struct StaticResolver {
    /// Name to addresses.
    pub entries: HashMap<String, Vec<SocketAddr>>,
    /// Names that hang forever.
    pub hanging: Vec<String>,
}

impl Resolver for StaticResolver {
    fn resolve(&self, name: &str) -> BoxFuture<'static, NetworkResult<Vec<SocketAddr>>> {
        if self.hanging.iter().any(|h| h == name) {
            return futures::future::pending().boxed();
        }
        let result = self
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| ux_network::NetworkError::Resolve(format!("no such host: {}", name)));
        async move { result }.boxed()
    }
}

/// Network options with timeouts shrunk for tests. Heartbeats are pushed
/// out so pings never interleave with scripted exchanges.
pub fn test_options() -> NetworkOptions {
    NetworkOptions {
        query_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(2),
        heartbeat_interval: Duration::from_secs(60),
        dead_time: Duration::from_secs(120),
        ..Default::default()
    }
}

/// A node running against a database in a temporary directory. The
/// directory lives as long as the handle and is removed on drop.
pub struct TestNode {
    /// The running node.
    pub node: Arc<Node>,
    _data_dir: TempDir,
}

impl std::ops::Deref for TestNode {
    type Target = Arc<Node>;

    fn deref(&self) -> &Arc<Node> {
        &self.node
    }
}

/// Spawn a loopback node with a tempdir-backed database and no seeds.
pub async fn spawn_node(name: &str) -> TestNode {
    spawn_node_with(
        name,
        test_options(),
        Arc::new(StaticResolver::default()),
        Vec::new(),
    )
    .await
}

/// Spawn a loopback node with explicit options, resolver, and DNS seeds.
pub async fn spawn_node_with(
    name: &str,
    options: NetworkOptions,
    resolver: Arc<dyn Resolver>,
    dns_seeds: Vec<String>,
) -> TestNode {
    let data_dir = TempDir::new().expect("create temp directory");
    let store = Arc::new(Database::open(data_dir.path()).expect("open database"));

    let config = NodeConfig {
        node_name: name.to_string(),
        data_dir: data_dir.path().to_path_buf(),
        network: ux_node::config::NetworkSettings {
            bind_address: "127.0.0.1:0".to_string(),
            declared_address: None,
            dns_seeds,
            static_seeds: Vec::new(),
            max_peers: options.max_peers,
            min_peers: options.min_peers,
        },
        ..Default::default()
    };
    let node = Node::start(config, options, store, resolver)
        .await
        .expect("node start");
    TestNode {
        node,
        _data_dir: data_dir,
    }
}

/// Poll a predicate until it holds or the timeout elapses.
pub async fn wait_until<F: Fn() -> bool>(predicate: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// The book key a node is known by to its peers.
pub fn key_of(node: &Node) -> PeerKey {
    node.our_key().clone()
}

/// Credit an account on a node's store.
pub fn fund_account(node: &Node, pair: &KeyPair, balance: u64, nonce: u64) {
    let addr = ux_crypto::address(&pair.public_key_bytes()).unwrap();
    put_account(node.store().as_ref(), &addr, &Account { balance, nonce }).unwrap();
}

/// Build a signed transfer from a key pair.
pub fn signed_transfer(pair: &KeyPair, nonce: u64, amount: u64) -> TxMessage {
    let tx = Transaction::new(TransactionPayload {
        version: 1,
        concilium_id: 0,
        nonce,
        gas_limit: ux_wire::TX_FEE,
        ins: Vec::new(),
        outs: vec![TxOutput::transfer(amount, [0x42u8; 20])],
    });
    let signature = ux_crypto::sign(&tx.hash(), pair.secret_key());
    TxMessage {
        tx,
        auth: Some(MessageAuth {
            signature,
            public_key: pair.public_key_bytes(),
        }),
    }
}

/// A scripted remote peer speaking the wire protocol directly.
pub struct TestPeer {
    connection: Connection,
    /// Identity advertised in our version message.
    pub info: PeerInfo,
    /// Our connection nonce.
    pub nonce: u64,
}

impl TestPeer {
    /// Dial a node, advertising `127.0.0.1:advertised_port` as identity.
    pub async fn connect(node_addr: SocketAddr, advertised_port: u16) -> Self {
        let transport = Transport::new(NETWORK_MAGIC, Duration::from_secs(2));
        let connection = transport.connect(node_addr).await.expect("dial node");
        let info = PeerInfo::new(
            canonical_address("127.0.0.1".parse().unwrap()),
            advertised_port,
            Capability::node(),
        );
        Self {
            connection,
            info,
            nonce: advertised_port as u64 + 1_000_000,
        }
    }

    /// Our version message.
    pub fn version(&self) -> Message {
        Message::Version(VersionPayload {
            protocol_version: PROTOCOL_VERSION,
            nonce: self.nonce,
            timestamp: 0,
            peer_info: self.info.clone(),
        })
    }

    /// Send one frame.
    pub async fn send(&mut self, message: Message) {
        self.connection.send(message).await.expect("send frame");
    }

    /// Receive the next frame, `None` on close or timeout.
    pub async fn recv(&mut self, timeout: Duration) -> Option<Message> {
        match tokio::time::timeout(timeout, self.connection.next()).await {
            Ok(Some(Ok(message))) => Some(message),
            _ => None,
        }
    }

    /// Receive frames until one matches, discarding the rest.
    pub async fn recv_until<F: Fn(&Message) -> bool>(
        &mut self,
        matches: F,
        timeout: Duration,
    ) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            if left.is_zero() {
                return None;
            }
            match self.recv(left).await {
                Some(message) if matches(&message) => return Some(message),
                Some(_) => continue,
                None => return None,
            }
        }
    }

    /// Run the dialer side of the handshake: send version, answer the
    /// node's version with verack, and wait for the node's verack.
    pub async fn handshake(&mut self) {
        self.send(self.version()).await;
        self.recv_until(|m| matches!(m, Message::Version(_)), Duration::from_secs(2))
            .await
            .expect("node version");
        self.send(Message::VerAck).await;
        self.recv_until(|m| matches!(m, Message::VerAck), Duration::from_secs(2))
            .await
            .expect("node verack");
    }
}
