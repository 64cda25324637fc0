//! # ux-network
//!
//! P2P networking layer for the uxnode blockchain.
//!
//! This crate provides:
//! - TCP transport: listening, dialing, name resolution, framing
//! - Per-peer state machines with misbehavior scoring and timed bans
//! - The address book with deduplication, capability filtering, and
//!   restriction windows
//! - Message fan-out as an explicit `(peer key, message)` event queue
//!
//! The node orchestrator in `ux-node` consumes this crate; per-peer
//! message ordering is strictly FIFO for both sends and dispatch.

mod discovery;
mod error;
mod manager;
mod peer;
mod transport;

pub use discovery::{resolve_seeds, DnsResolver, Resolver};
pub use error::{NetworkError, NetworkResult};
pub use manager::{NetworkOptions, PeerEvent, PeerManager};
pub use peer::{PeerKey, PeerSnapshot, PeerState};
pub use transport::{
    address_to_string, canonical_address, socket_addr_of, str_to_address, Connection, Transport,
};

use std::time::Duration;

/// Network magic carried by every frame.
pub const NETWORK_MAGIC: u32 = 0x1288_2304;

/// Protocol version advertised in `version` messages.
pub const PROTOCOL_VERSION: u16 = 0x0123;

/// Default P2P port.
pub const DEFAULT_PORT: u16 = 8223;

/// Maximum number of live peers to maintain.
pub const MAX_PEERS: usize = 10;

/// Minimum number of live peers to maintain.
pub const MIN_PEERS: usize = 3;

/// Maximum peers per `addr` message; longer books are split.
pub const ADDR_MAX_LENGTH: usize = 1000;

/// Timeout for DNS bootstrap and per-peer initial load.
pub const PEER_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for an outbound TCP connection attempt.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Misbehavior score at which a peer is banned.
pub const BAN_PEER_SCORE: u32 = 100;

/// Duration of a ban.
pub const BAN_PEER_TIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Heartbeat ping interval.
pub const PEER_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// A peer silent for this long is force-disconnected.
pub const PEER_DEAD_TIME: Duration = Duration::from_secs(6 * 60);

/// Connections older than this are recycled.
pub const PEER_CONNECTION_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Byte budget per connection before recycling.
pub const PEER_MAX_BYTES_COUNT: u64 = 10 * 1024 * 1024;

/// Redial backoff after a failed or recycled connection.
pub const PEER_RESTRICT_TIME: Duration = Duration::from_secs(2 * 60);

/// Reconnection loop interval.
pub const PEER_RECONNECT_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Watchdog tick interval.
pub const PEER_TICK_TIMEOUT: Duration = Duration::from_secs(1);

/// Address book persistence interval.
pub const PEERMANAGER_BACKUP_TIMEOUT: Duration = Duration::from_secs(10 * 60);
