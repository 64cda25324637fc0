//! Handshake protocol scenarios.

use crate::harness::*;
use std::time::Duration;
use ux_network::{PeerState, PROTOCOL_VERSION};
use ux_wire::{Message, VersionPayload, REJECT_DUPLICATE};

#[tokio::test]
async fn test_self_loop_is_banned() {
    let node = spawn_node("self-loop").await;
    let addr = node.listen_addr();

    // Dialing ourselves: the inbound side sees our own nonce
    let _ = node.connect_to(addr).await;

    let manager = node.manager().clone();
    assert!(
        wait_until(
            || manager.all_peers().iter().any(|p| p.state == PeerState::Banned),
            Duration::from_secs(2)
        )
        .await,
        "self-connection was not banned"
    );
    assert_eq!(node.manager().fully_connected_count(), 0);
}

#[tokio::test]
async fn test_outbound_handshake_completes() {
    let a = spawn_node("alpha").await;
    let b = spawn_node("beta").await;

    a.connect_to(b.listen_addr()).await.unwrap();

    let (am, bm) = (a.manager().clone(), b.manager().clone());
    assert!(
        wait_until(
            || am.fully_connected_count() == 1 && bm.fully_connected_count() == 1,
            Duration::from_secs(3)
        )
        .await,
        "handshake did not complete on both sides"
    );

    // The outbound side solicited the peer's book and got at least one
    // addr back, firing the load latch
    let b_key = key_of(&b);
    let am2 = a.manager().clone();
    assert!(
        wait_until(
            || am2.snapshot(&b_key).map(|s| s.load_done).unwrap_or(false),
            Duration::from_secs(3)
        )
        .await,
        "initial load did not complete"
    );

    // Both ends recorded the protocol version
    assert_eq!(a.manager().snapshot(&b_key).unwrap().version, Some(PROTOCOL_VERSION));
}

#[tokio::test]
async fn test_message_before_handshake_is_penalized() {
    let node = spawn_node("gatekeeper").await;
    let pair = ux_crypto::KeyPair::generate();
    fund_account(&node, &pair, 100_000, 0);

    let mut peer = TestPeer::connect(node.listen_addr(), 9100).await;
    // A tx before any handshake
    peer.send(Message::Tx(signed_transfer(&pair, 0, 500))).await;

    let manager = node.manager().clone();
    assert!(
        wait_until(
            || manager.all_peers().iter().any(|p| p.misbehavior_score == 1),
            Duration::from_secs(2)
        )
        .await,
        "premature message was not penalized"
    );
    assert!(node.mempool().is_empty(), "premature tx reached the mempool");

    // A second premature message costs another point
    peer.send(Message::GetAddr).await;
    let manager = node.manager().clone();
    assert!(
        wait_until(
            || manager.all_peers().iter().any(|p| p.misbehavior_score == 2),
            Duration::from_secs(2)
        )
        .await
    );
}

#[tokio::test]
async fn test_duplicate_connection_rejected() {
    let node = spawn_node("dedup").await;

    let mut first = TestPeer::connect(node.listen_addr(), 9200).await;
    first.handshake().await;

    let identity = ux_network::PeerKey::from_info(&first.info);
    let manager = node.manager().clone();
    let id = identity.clone();
    assert!(
        wait_until(
            || manager
                .snapshot(&id)
                .map(|s| s.state == PeerState::FullyConnected)
                .unwrap_or(false),
            Duration::from_secs(2)
        )
        .await
    );

    // Second connection claiming the same identity
    let mut second = TestPeer::connect(node.listen_addr(), 9200).await;
    second.nonce = first.nonce + 7;
    second.send(second.version()).await;

    let reject = second
        .recv_until(|m| matches!(m, Message::Reject(_)), Duration::from_secs(2))
        .await
        .expect("expected a reject");
    match reject {
        Message::Reject(payload) => {
            assert_eq!(payload.code, REJECT_DUPLICATE);
            assert_eq!(payload.reason, "Duplicate connection detected");
        }
        other => panic!("unexpected message: {:?}", other),
    }

    // The new connection is closed...
    assert!(second.recv(Duration::from_millis(500)).await.is_none());

    // ...and the original peer is untouched
    assert_eq!(
        node.manager().snapshot(&identity).unwrap().state,
        PeerState::FullyConnected
    );
}

#[tokio::test]
async fn test_incompatible_protocol_disconnects_without_ban() {
    let node = spawn_node("strict").await;

    let mut peer = TestPeer::connect(node.listen_addr(), 9250).await;
    peer.send(Message::Version(VersionPayload {
        protocol_version: 0x0001,
        nonce: peer.nonce,
        timestamp: 0,
        peer_info: peer.info.clone(),
    }))
    .await;

    // Connection closes with no reply
    assert!(peer.recv(Duration::from_secs(1)).await.is_none());
    assert!(
        !node
            .manager()
            .all_peers()
            .iter()
            .any(|p| p.state == PeerState::Banned),
        "incompatible protocol must not ban"
    );
}

#[tokio::test]
async fn test_duplicate_version_costs_one_point() {
    let node = spawn_node("once").await;

    let mut peer = TestPeer::connect(node.listen_addr(), 9260).await;
    peer.handshake().await;
    peer.send(peer.version()).await;

    let identity = ux_network::PeerKey::from_info(&peer.info);
    let manager = node.manager().clone();
    assert!(
        wait_until(
            || manager
                .snapshot(&identity)
                .map(|s| s.misbehavior_score == 1)
                .unwrap_or(false),
            Duration::from_secs(2)
        )
        .await
    );
    // Still connected; one point is far from the ban threshold
    assert_eq!(
        node.manager().snapshot(&identity).unwrap().state,
        PeerState::FullyConnected
    );
}

#[tokio::test]
async fn test_misbehavior_accumulates_to_ban() {
    let node = spawn_node("banhammer").await;

    let mut peer = TestPeer::connect(node.listen_addr(), 9270).await;
    // 100 premature messages cross BAN_PEER_SCORE
    for _ in 0..ux_network::BAN_PEER_SCORE {
        peer.send(Message::Ping).await;
    }

    let manager = node.manager().clone();
    assert!(
        wait_until(
            || manager.all_peers().iter().any(|p| p.state == PeerState::Banned),
            Duration::from_secs(3)
        )
        .await,
        "peer was not banned"
    );

    // The connection is closed once banned
    assert!(peer
        .recv_until(|_| false, Duration::from_millis(800))
        .await
        .is_none());
}
