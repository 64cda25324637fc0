//! # ux-node
//!
//! The uxnode orchestrator: bootstrap, the version/verack handshake
//! protocol, address gossip, transaction relay, and the peer watchdog,
//! plus the witness/concilium boundary the consensus machine plugs into.

pub mod config;
pub mod node;
pub mod validate;
pub mod witness;

pub use config::{NetworkSettings, NodeConfig, WitnessSettings};
pub use node::Node;
pub use validate::{validate_tx, TxError};
pub use witness::{assemble_block, Concilium, BLOCK_CREATION_TIME_LIMIT};
