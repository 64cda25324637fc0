//! Address gossip scenarios.

use crate::harness::*;
use std::sync::Arc;
use std::time::Duration;
use ux_wire::{AddrPayload, Capability, Message, PeerInfo};

fn fake_info(last_octet: u8, port: u16) -> PeerInfo {
    let mut address = vec![0u8; 16];
    address[10] = 0xff;
    address[11] = 0xff;
    address[12] = 10;
    address[15] = last_octet;
    PeerInfo::new(address, port, Capability::node())
}

#[tokio::test]
async fn test_getaddr_chunks_at_addr_max_length() {
    let mut options = test_options();
    options.addr_max_length = 3;
    let node = spawn_node_with(
        "chunker",
        options,
        Arc::new(StaticResolver::default()),
        Vec::new(),
    )
    .await;

    // Eight known records plus the connecting peer itself
    for i in 1..=8 {
        node.manager().add_peer_info(fake_info(i, 8223));
    }

    let mut peer = TestPeer::connect(node.listen_addr(), 9400).await;
    peer.handshake().await;
    peer.send(Message::GetAddr).await;

    let mut chunks = Vec::new();
    while let Some(message) = peer
        .recv_until(|m| matches!(m, Message::Addr(_)), Duration::from_millis(600))
        .await
    {
        if let Message::Addr(payload) = message {
            chunks.push(payload.peers.len());
        }
    }

    assert!(chunks.len() >= 3, "book of 9 must span several addr frames");
    assert!(chunks.iter().all(|&len| len <= 3), "chunk over the cap: {:?}", chunks);
    assert_eq!(chunks.iter().sum::<usize>(), 9);
}

#[tokio::test]
async fn test_addr_entries_merge_idempotently() {
    let node = spawn_node("bookkeeper").await;

    let mut peer = TestPeer::connect(node.listen_addr(), 9410).await;
    peer.handshake().await;
    let before = node.manager().book_len();

    let payload = AddrPayload {
        peers: vec![fake_info(1, 8223), fake_info(2, 8223)],
    };
    peer.send(Message::Addr(payload.clone())).await;

    let manager = node.manager().clone();
    assert!(
        wait_until(
            || manager.book_len() == before + 2,
            Duration::from_secs(2)
        )
        .await
    );

    // The same entries again do not grow the book
    peer.send(Message::Addr(payload)).await;
    peer.send(Message::Ping).await;
    peer.recv_until(|m| matches!(m, Message::Pong), Duration::from_secs(2))
        .await
        .expect("pong");
    assert_eq!(node.manager().book_len(), before + 2);
}

#[tokio::test]
async fn test_addr_marks_load_done() {
    let node = spawn_node("loader").await;

    let mut peer = TestPeer::connect(node.listen_addr(), 9420).await;
    peer.handshake().await;

    let identity = ux_network::PeerKey::from_info(&peer.info);
    assert!(!node.manager().snapshot(&identity).unwrap().load_done);

    peer.send(Message::Addr(AddrPayload { peers: Vec::new() }))
        .await;

    let manager = node.manager().clone();
    assert!(
        wait_until(
            || manager
                .snapshot(&identity)
                .map(|s| s.load_done)
                .unwrap_or(false),
            Duration::from_secs(2)
        )
        .await
    );
}

#[tokio::test]
async fn test_own_identity_not_gossiped_back_into_book() {
    let node = spawn_node("vain").await;

    let mut peer = TestPeer::connect(node.listen_addr(), 9430).await;
    peer.handshake().await;
    let before = node.manager().book_len();

    // Gossip the node's own identity back at it
    let own = PeerInfo {
        address: node.our_key().address.clone(),
        port: node.our_key().port,
        capabilities: vec![Capability::node()],
    };
    peer.send(Message::Addr(AddrPayload { peers: vec![own] }))
        .await;
    peer.send(Message::Ping).await;
    peer.recv_until(|m| matches!(m, Message::Pong), Duration::from_secs(2))
        .await
        .expect("pong");

    assert_eq!(node.manager().book_len(), before);
}
