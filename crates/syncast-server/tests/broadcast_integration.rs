#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! End-to-end tests over real loopback TCP sockets.
//!
//! Tests the full flow: listener → registry → coordinator → transport,
//! with plain `TcpStream` clients decoding what they receive.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use syncast_core::{BroadcastMessage, FrameDecoder};
use syncast_server::broadcast::{BroadcastCoordinator, unix_now};
use syncast_server::listener::BroadcastListener;
use syncast_server::registry::ConnectionRegistry;

async fn start_server() -> (SocketAddr, ConnectionRegistry, BroadcastCoordinator) {
    let listener = BroadcastListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr();
    let registry = ConnectionRegistry::new();
    tokio::spawn(listener.serve(registry.clone()));
    let coordinator = BroadcastCoordinator::new(
        registry.clone(),
        Duration::from_secs(5),
        Duration::from_secs(5),
    );
    (addr, registry, coordinator)
}

async fn wait_for_len(registry: &ConnectionRegistry, expected: usize) {
    for _ in 0..200 {
        if registry.len() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "registry never reached {expected} connections (has {})",
        registry.len()
    );
}

async fn read_message(client: &mut TcpStream, len: usize) -> BroadcastMessage {
    let mut buf = vec![0u8; len];
    client.read_exact(&mut buf).await.unwrap();
    let mut decoder = FrameDecoder::new();
    decoder.push(&buf);
    let message = decoder.next_message().unwrap();
    assert_eq!(decoder.buffered_len(), 0);
    message
}

// =========================================================================
// Broadcast delivery
// =========================================================================

#[tokio::test]
async fn play_then_stop_reach_every_client() {
    let (addr, registry, coordinator) = start_server().await;
    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(TcpStream::connect(addr).await.unwrap());
    }
    wait_for_len(&registry, 3).await;

    let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    let start_at = unix_now() + 10;
    let play = coordinator
        .broadcast_play(payload.clone(), start_at)
        .unwrap();
    let stop = coordinator.broadcast_stop();
    assert_eq!(play.attempted(), 3);
    assert_eq!(stop.attempted(), 3);

    for client in &mut clients {
        let received = read_message(client, 8 + payload.len() + 8).await;
        assert_eq!(received, BroadcastMessage::play(start_at, payload.clone()));
        assert_eq!(read_message(client, 8).await, BroadcastMessage::Stop);
    }
    assert_eq!(play.report().await.delivered(), 3);
    assert_eq!(stop.report().await.delivered(), 3);
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn closed_client_is_pruned_and_skipped() {
    let (addr, registry, coordinator) = start_server().await;
    let mut stays = TcpStream::connect(addr).await.unwrap();
    let leaves = TcpStream::connect(addr).await.unwrap();
    wait_for_len(&registry, 2).await;

    drop(leaves);
    wait_for_len(&registry, 1).await;

    let report = coordinator.broadcast_stop().report().await;
    assert_eq!(report.attempted(), 1);
    assert_eq!(report.delivered(), 1);
    assert_eq!(read_message(&mut stays, 8).await, BroadcastMessage::Stop);
}

#[tokio::test]
async fn disconnect_all_closes_clients_and_empties_registry() {
    let (addr, registry, coordinator) = start_server().await;
    let mut clients = Vec::new();
    for _ in 0..4 {
        clients.push(TcpStream::connect(addr).await.unwrap());
    }
    wait_for_len(&registry, 4).await;

    assert_eq!(coordinator.disconnect_all(), 4);
    wait_for_len(&registry, 0).await;

    for client in &mut clients {
        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    assert!(coordinator.broadcast_stop().is_noop());
}
