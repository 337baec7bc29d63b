//! Host migration: the master leaves and a survivor takes over.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use common::{counter, eventually, online, settle};
use hostlink::SessionPhase;
use hostlink::protocol::{InitialState, PeerId, Vec3};
use hostlink::transport::MemoryRelay;

async fn room_of_two(relay: &MemoryRelay) -> (common::Client, common::Client) {
    let alice = online(relay, "alice").await;
    let bob = online(relay, "bob").await;
    assert!(alice.host_game("alpha", "training_ground", None).await.unwrap());
    assert!(bob.join_game("alpha").await.unwrap());
    settle().await;
    (alice, bob)
}

// =========================================================================
// Takeover triggers
// =========================================================================

#[tokio::test]
async fn test_host_disconnect_promotes_survivor_and_starts_simulation() {
    let relay = MemoryRelay::start();
    let (alice, bob) = room_of_two(&relay).await;
    assert!(!bob.server().is_running());

    alice.disconnect();

    let b = Arc::clone(&bob);
    eventually(move || b.server().is_running()).await;
    assert!(bob.is_master());
    assert_eq!(bob.session().phase(), SessionPhase::InSession);
    assert!(!bob.session().is_takeover_pending());
    assert!(!bob.roster().contains(&PeerId::new("alice")));
    assert!(!alice.server().is_running());
    assert_eq!(alice.session().phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_host_network_loss_promotes_survivor() {
    let relay = MemoryRelay::start();
    let (_alice, bob) = room_of_two(&relay).await;

    relay.drop_connection(&PeerId::new("alice"));

    let b = Arc::clone(&bob);
    eventually(move || b.server().is_running()).await;
    assert!(bob.is_master());
}

#[tokio::test]
async fn test_host_leave_game_promotes_survivor() {
    let relay = MemoryRelay::start();
    let (alice, bob) = room_of_two(&relay).await;

    alice.leave_game();

    let b = Arc::clone(&bob);
    eventually(move || b.server().is_running()).await;
    assert!(!alice.server().is_running());
}

#[tokio::test]
async fn test_repeated_takeover_is_noop_while_running() {
    let relay = MemoryRelay::start();
    let (alice, bob) = room_of_two(&relay).await;
    alice.disconnect();
    let b = Arc::clone(&bob);
    eventually(move || b.server().is_running()).await;
    let (snapshots, snapshot_count) = counter();
    bob.router().channels().on_initial_state.add(move |_| {
        snapshots.fetch_add(1, Ordering::SeqCst);
    });

    assert!(!bob.session().handle_takeover("alpha").unwrap());
    assert!(!bob.session().handle_master_switch(&PeerId::new("bob")).unwrap());

    assert!(bob.server().is_running());
    assert_eq!(snapshot_count(), 0);
}

#[tokio::test]
async fn test_master_switch_to_other_peer_is_ignored() {
    let relay = MemoryRelay::start();
    let (_alice, bob) = room_of_two(&relay).await;

    assert!(!bob.session().handle_master_switch(&PeerId::new("carol")).unwrap());

    assert!(!bob.server().is_running());
    assert!(!bob.session().is_takeover_pending());
}

// =========================================================================
// After takeover
// =========================================================================

#[tokio::test]
async fn test_new_host_processes_its_own_requests_locally() {
    let relay = MemoryRelay::start();
    let (alice, bob) = room_of_two(&relay).await;
    alice.disconnect();
    let b = Arc::clone(&bob);
    eventually(move || b.server().is_running()).await;
    let (fires, fire_count) = counter();
    bob.router().channels().on_fire.add(move |shot| {
        assert_eq!(shot.shooter.as_str(), "bob");
        fires.fetch_add(1, Ordering::SeqCst);
    });

    bob.fire("Pistol", Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0)).unwrap();

    assert_eq!(fire_count(), 1);
}

#[tokio::test]
async fn test_takeover_snapshot_carries_roster_health() {
    let relay = MemoryRelay::start();
    let (alice, bob) = room_of_two(&relay).await;
    let bob_id = PeerId::new("bob");

    // Alice shoots Bob while she is still the host.
    alice.hit(&bob_id, "Pistol", 30.0, false).unwrap();
    let b = Arc::clone(&bob);
    let id = bob_id.clone();
    eventually(move || b.roster().get(&id).is_some_and(|p| p.health == 70.0)).await;

    let snapshots: Arc<Mutex<Vec<InitialState>>> = Arc::default();
    let sink = Arc::clone(&snapshots);
    bob.router().channels().on_initial_state.add(move |state| {
        sink.lock().unwrap().push(state.clone());
    });

    alice.disconnect();

    let s = Arc::clone(&snapshots);
    eventually(move || !s.lock().unwrap().is_empty()).await;
    let snapshot = snapshots.lock().unwrap()[0].clone();
    assert_eq!(snapshot.players.len(), 1);
    assert_eq!(snapshot.players[0].id, bob_id);
    assert_eq!(snapshot.players[0].health, 70.0);
    assert_eq!(snapshot.map_id.as_deref(), Some("training_ground"));
}

#[tokio::test]
async fn test_late_joiner_is_served_by_new_host() {
    let relay = MemoryRelay::start();
    let (alice, bob) = room_of_two(&relay).await;
    alice.disconnect();
    let b = Arc::clone(&bob);
    eventually(move || b.server().is_running()).await;

    let carol = online(&relay, "carol").await;
    let (fires, fire_count) = counter();
    carol.router().channels().on_fire.add(move |_| {
        fires.fetch_add(1, Ordering::SeqCst);
    });
    assert!(carol.join_game("alpha").await.unwrap());
    settle().await;

    carol.fire("Pistol", Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)).unwrap();

    let count = fire_count.clone();
    eventually(move || count() == 1).await;
    assert!(!carol.server().is_running());
}
