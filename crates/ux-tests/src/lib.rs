//! Integration tests for the uxnode networking core.
//!
//! The harness spins real nodes on loopback ephemeral ports, each with
//! its own tempdir-backed database and a stub resolver; scenario tests
//! drive them over actual TCP connections.

pub mod harness;

#[cfg(test)]
mod gossip_tests;
#[cfg(test)]
mod handshake_tests;
