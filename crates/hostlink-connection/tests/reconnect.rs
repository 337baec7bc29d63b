//! Connection manager driven by the in-memory relay.
//!
//! A small pump task forwards the relay's state notifications into the
//! manager, the way the client facade does in production.

use std::sync::Arc;
use std::time::Duration;

use hostlink_connection::{ConnectionManager, ReconnectPolicy};
use hostlink_transport::{
    ConnectionState, MemoryProvider, MemoryRelay, PeerId, TransportNotification,
    TransportProvider,
};
use tokio::task::JoinHandle;

// =========================================================================
// Helpers
// =========================================================================

fn policy() -> ReconnectPolicy {
    ReconnectPolicy {
        delay: Duration::from_secs(2),
        jitter: Duration::ZERO,
        ..ReconnectPolicy::with_user_id("alice")
    }
}

fn manager(
    relay: &MemoryRelay,
    policy: ReconnectPolicy,
) -> (Arc<ConnectionManager<MemoryProvider>>, JoinHandle<()>) {
    let manager = ConnectionManager::new(Arc::new(relay.provider()), policy);
    let mut rx = manager.provider().subscribe();
    let pumped = Arc::clone(&manager);
    let pump = tokio::spawn(async move {
        while let Ok(notification) = rx.recv().await {
            if let TransportNotification::StateChanged(state) = notification {
                pumped.handle_state_change(state);
            }
        }
    });
    (manager, pump)
}

async fn wait_for(
    manager: &ConnectionManager<MemoryProvider>,
    expected: ConnectionState,
) {
    let mut rx = manager.subscribe();
    tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| *s == expected))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

// =========================================================================
// Connect
// =========================================================================

#[tokio::test]
async fn test_connect_reaches_lobby() {
    let relay = MemoryRelay::start();
    let (manager, _pump) = manager(&relay, policy());

    assert!(manager.connect("alice").await);
    wait_for(&manager, ConnectionState::InLobby).await;
    assert!(manager.is_connected());
    assert_eq!(
        manager.provider().local_player_id(),
        Some(PeerId::new("alice"))
    );
}

#[tokio::test]
async fn test_connect_while_connected_returns_false() {
    let relay = MemoryRelay::start();
    let (manager, _pump) = manager(&relay, policy());

    assert!(manager.connect("alice").await);
    wait_for(&manager, ConnectionState::InLobby).await;
    assert!(!manager.connect("alice").await);
}

#[tokio::test]
async fn test_concurrent_connects_only_one_proceeds() {
    let relay = MemoryRelay::start();
    let (manager, _pump) = manager(&relay, policy());

    let (first, second) =
        tokio::join!(manager.connect("alice"), manager.connect("alice"));
    assert!(first);
    assert!(!second);
}

#[tokio::test]
async fn test_connect_unreachable_relay_reports_error_state() {
    let relay = MemoryRelay::start();
    relay.set_reachable(false);
    let (manager, _pump) = manager(&relay, ReconnectPolicy::disabled());

    assert!(!manager.connect("alice").await);
    wait_for(&manager, ConnectionState::Error).await;
}

// =========================================================================
// Reconnect
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_dropped_connection_reconnects_after_delay() {
    let relay = MemoryRelay::start();
    let (manager, _pump) = manager(&relay, policy());

    assert!(manager.connect("alice").await);
    wait_for(&manager, ConnectionState::InLobby).await;

    relay.drop_connection(&PeerId::new("alice"));
    wait_for(&manager, ConnectionState::Disconnected).await;
    assert!(manager.reconnect_pending());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(manager.state(), ConnectionState::InLobby);
    assert_eq!(manager.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_default_policy_reconnects_under_same_id() {
    let relay = MemoryRelay::start();
    let default_timings = ReconnectPolicy {
        jitter: Duration::ZERO,
        ..ReconnectPolicy::default()
    };
    let (manager, _pump) = manager(&relay, default_timings);

    assert!(manager.connect("alice").await);
    wait_for(&manager, ConnectionState::InLobby).await;

    relay.drop_connection(&PeerId::new("alice"));
    wait_for(&manager, ConnectionState::Disconnected).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(manager.state(), ConnectionState::InLobby);
    assert_eq!(
        manager.provider().local_player_id(),
        Some(PeerId::new("alice"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_explicit_disconnect_does_not_reconnect() {
    let relay = MemoryRelay::start();
    let (manager, _pump) = manager(&relay, policy());

    assert!(manager.connect("alice").await);
    wait_for(&manager, ConnectionState::InLobby).await;

    manager.disconnect();
    wait_for(&manager, ConnectionState::Disconnected).await;

    // A late Disconnected notification changes nothing either.
    manager.handle_state_change(ConnectionState::Disconnected);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(manager.provider().local_player_id().is_none());
    assert_eq!(manager.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_explicit_disconnect_rearms_policy() {
    let relay = MemoryRelay::start();
    let (manager, _pump) = manager(&relay, policy());

    assert!(manager.connect("alice").await);
    wait_for(&manager, ConnectionState::InLobby).await;
    manager.disconnect();
    wait_for(&manager, ConnectionState::Disconnected).await;

    assert!(manager.connect("alice").await);
    wait_for(&manager, ConnectionState::InLobby).await;

    relay.drop_connection(&PeerId::new("alice"));
    wait_for(&manager, ConnectionState::Disconnected).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(manager.state(), ConnectionState::InLobby);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_relay_keeps_retrying_until_back() {
    let relay = MemoryRelay::start();
    relay.set_reachable(false);
    let (manager, _pump) = manager(&relay, policy());

    assert!(!manager.connect("alice").await);
    wait_for(&manager, ConnectionState::Error).await;

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert!(manager.reconnect_attempts() >= 1);
    assert_eq!(manager.state(), ConnectionState::Error);

    relay.set_reachable(true);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(manager.state(), ConnectionState::InLobby);
    assert_eq!(manager.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_policy_stays_disconnected() {
    let relay = MemoryRelay::start();
    let (manager, _pump) = manager(&relay, ReconnectPolicy::disabled());

    assert!(manager.connect("alice").await);
    wait_for(&manager, ConnectionState::InLobby).await;
    relay.drop_connection(&PeerId::new("alice"));
    wait_for(&manager, ConnectionState::Disconnected).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}
