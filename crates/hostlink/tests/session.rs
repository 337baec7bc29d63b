//! Host, join and leave flows between clients on one relay.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{counter, eventually, online, online_with, record_raw, settle};
use hostlink::authority::{
    AuthoritativeSimulation, LogicalServer, LogicalServerConfig, SimulationError,
};
use hostlink::connection::ReconnectPolicy;
use hostlink::protocol::{EventCode, PeerId, Sender, ShotFired, Vec3};
use hostlink::room::RoomConfig;
use hostlink::transport::{ConnectionState, MemoryRelay, TransportProvider};
use hostlink::{HostlinkError, NetworkClient, SessionPhase};

fn forward() -> Vec3 {
    Vec3::new(0.0, 0.0, 1.0)
}

// =========================================================================
// Hosting
// =========================================================================

#[tokio::test]
async fn test_host_game_starts_simulation_and_enters_session() {
    let relay = MemoryRelay::start();
    let alice = online(&relay, "alice").await;

    assert!(alice.host_game("alpha", "training_ground", Some("waves")).await.unwrap());

    assert_eq!(alice.session().phase(), SessionPhase::InSession);
    assert_eq!(alice.session().room().as_deref(), Some("alpha"));
    assert!(alice.server().is_running());
    assert!(alice.is_master());
    assert!(alice.roster().contains(&PeerId::new("alice")));
}

#[tokio::test]
async fn test_host_game_when_offline_returns_false() {
    let relay = MemoryRelay::start();
    let alice = NetworkClient::builder(relay.provider())
        .reconnect_policy(ReconnectPolicy::disabled())
        .build();

    assert!(!alice.host_game("alpha", "training_ground", None).await.unwrap());

    assert_eq!(alice.session().phase(), SessionPhase::Idle);
    assert!(!alice.server().is_running());
}

#[tokio::test]
async fn test_host_game_duplicate_room_returns_false() {
    let relay = MemoryRelay::start();
    let alice = online(&relay, "alice").await;
    let bob = online(&relay, "bob").await;
    assert!(alice.host_game("alpha", "training_ground", None).await.unwrap());

    assert!(!bob.host_game("alpha", "docks", None).await.unwrap());
    assert!(!bob.server().is_running());
}

#[tokio::test]
async fn test_host_game_simulation_failure_propagates_and_retry_succeeds() {
    let relay = MemoryRelay::start();
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    let alice = NetworkClient::builder(relay.provider())
        .reconnect_policy(ReconnectPolicy::disabled())
        .simulation(move |dispatcher, params| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(SimulationError::StartFailed("map not loaded".into()));
            }
            let server = LogicalServer::new(dispatcher, LogicalServerConfig::default(), params);
            Ok(Box::new(server) as Box<dyn AuthoritativeSimulation>)
        })
        .build();
    common::spawn_pump(&alice);
    assert!(alice.connect("alice").await);
    let a = Arc::clone(&alice);
    eventually(move || a.connection().state().can_enter_room()).await;

    let result = alice.host_game("alpha", "training_ground", None).await;

    assert!(matches!(
        result,
        Err(HostlinkError::Simulation(SimulationError::StartFailed(_)))
    ));
    assert!(!alice.server().is_running());
    assert_eq!(alice.session().phase(), SessionPhase::Hosting);

    assert!(alice.session().handle_takeover("alpha").unwrap());
    assert!(alice.server().is_running());
    assert_eq!(alice.session().phase(), SessionPhase::InSession);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test]
async fn test_join_game_reads_map_id_set_by_host() {
    let relay = MemoryRelay::start();
    let alice = online(&relay, "alice").await;
    let bob = online(&relay, "bob").await;
    let carol = online(&relay, "carol").await;
    alice.host_game("alpha", "training_ground", None).await.unwrap();

    assert!(bob.join_game("alpha").await.unwrap());

    assert_eq!(bob.map_id().as_deref(), Some("training_ground"));
    assert_eq!(carol.map_id(), None);
    assert!(!bob.server().is_running());
    assert_eq!(bob.session().phase(), SessionPhase::InSession);
}

#[tokio::test]
async fn test_join_game_missing_room_returns_false() {
    let relay = MemoryRelay::start();
    let bob = online(&relay, "bob").await;

    assert!(!bob.join_game("nowhere").await.unwrap());
    assert_eq!(bob.session().phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_join_game_receives_snapshot_from_host() {
    let relay = MemoryRelay::start();
    let alice = online(&relay, "alice").await;
    let bob = online(&relay, "bob").await;
    alice.host_game("alpha", "training_ground", None).await.unwrap();
    let (snapshots, snapshot_count) = counter();
    bob.router().channels().on_initial_state.add(move |state| {
        if state.players.len() == 2 {
            snapshots.fetch_add(1, Ordering::SeqCst);
        }
    });

    bob.join_game("alpha").await.unwrap();

    eventually(move || snapshot_count() >= 1).await;
    assert_eq!(bob.roster().len(), 2);
}

#[tokio::test]
async fn test_join_empty_retained_room_makes_joiner_host() {
    let relay = MemoryRelay::start();
    let retained = RoomConfig {
        empty_room_ttl: Some(Duration::from_secs(30)),
        ..RoomConfig::default()
    };
    let alice = online_with(&relay, "alice", retained).await;
    let bob = online(&relay, "bob").await;
    alice.host_game("alpha", "training_ground", None).await.unwrap();
    alice.leave_game();
    settle().await;

    assert!(bob.join_game("alpha").await.unwrap());

    assert!(bob.is_master());
    assert!(bob.server().is_running());
    assert!(!bob.session().is_takeover_pending());
    assert_eq!(bob.map_id().as_deref(), Some("training_ground"));
}

// =========================================================================
// Requests
// =========================================================================

#[tokio::test]
async fn test_non_master_fire_reaches_host_only_through_relay() {
    let relay = MemoryRelay::start();
    let alice = online(&relay, "alice").await;
    let bob = online(&relay, "bob").await;
    alice.host_game("alpha", "training_ground", None).await.unwrap();
    bob.join_game("alpha").await.unwrap();
    settle().await;
    let host_saw = record_raw(&alice, EventCode::Fire);
    let bob_saw = record_raw(&bob, EventCode::Fire);
    let confirmed: Arc<Mutex<Vec<ShotFired>>> = Arc::default();
    let sink = Arc::clone(&confirmed);
    bob.router().channels().on_fire.add(move |shot| sink.lock().unwrap().push(shot.clone()));

    bob.fire("Pistol", Vec3::ZERO, forward()).unwrap();

    let c = Arc::clone(&confirmed);
    eventually(move || !c.lock().unwrap().is_empty()).await;
    assert!(bob_saw.lock().unwrap().is_empty());
    let host_saw = host_saw.lock().unwrap();
    assert_eq!(host_saw.len(), 1);
    assert_eq!(host_saw[0].sender, Sender::Peer(PeerId::new("bob")));
    let confirmed = confirmed.lock().unwrap();
    assert_eq!(confirmed[0].shooter.as_str(), "bob");
    assert_eq!(confirmed[0].ammo, 11);
}

#[tokio::test]
async fn test_master_reload_loops_back_once_as_itself() {
    let relay = MemoryRelay::start();
    let alice = online(&relay, "alice").await;
    let bob = online(&relay, "bob").await;
    alice.host_game("alpha", "training_ground", None).await.unwrap();
    bob.join_game("alpha").await.unwrap();
    settle().await;
    let host_saw = record_raw(&alice, EventCode::Reload);
    let bob_saw = record_raw(&bob, EventCode::Reload);
    let (reloads, reload_count) = counter();
    bob.router().channels().on_reload.add(move |reload| {
        assert_eq!(reload.player.as_str(), "alice");
        reloads.fetch_add(1, Ordering::SeqCst);
    });

    alice.reload("Pistol").unwrap();

    {
        let host_saw = host_saw.lock().unwrap();
        assert_eq!(host_saw.len(), 1);
        assert_eq!(host_saw[0].sender, Sender::Peer(PeerId::new("alice")));
    }
    let count = reload_count.clone();
    eventually(move || count() == 1).await;
    settle().await;
    assert!(bob_saw.lock().unwrap().is_empty());
    assert_eq!(reload_count(), 1);
}

#[tokio::test]
async fn test_master_holds_remote_request_for_simulation() {
    let relay = MemoryRelay::start();
    let alice = online(&relay, "alice").await;
    let bob = online(&relay, "bob").await;
    alice.host_game("alpha", "training_ground", None).await.unwrap();
    bob.join_game("alpha").await.unwrap();
    settle().await;
    let host_saw = record_raw(&alice, EventCode::Reload);
    let reloads: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&reloads);
    alice.router().channels().on_reload.add(move |reload| {
        sink.lock().unwrap().push(reload.player.to_string());
    });

    bob.reload("Pistol").unwrap();

    let r = Arc::clone(&reloads);
    eventually(move || !r.lock().unwrap().is_empty()).await;
    assert_eq!(host_saw.lock().unwrap().len(), 1);
    // Only the simulation's confirmation, never the raw request.
    assert_eq!(*reloads.lock().unwrap(), vec!["bob".to_string()]);
}

#[tokio::test]
async fn test_chat_reaches_other_peer_with_sender() {
    let relay = MemoryRelay::start();
    let alice = online(&relay, "alice").await;
    let bob = online(&relay, "bob").await;
    alice.host_game("alpha", "training_ground", None).await.unwrap();
    bob.join_game("alpha").await.unwrap();
    let chats: Arc<Mutex<Vec<(Sender, String)>>> = Arc::default();
    let sink = Arc::clone(&chats);
    alice.router().channels().on_chat.add(move |chat| {
        sink.lock()
            .unwrap()
            .push((chat.sender.clone(), chat.payload.text.clone()));
    });

    bob.send_chat("gg").unwrap();

    let c = Arc::clone(&chats);
    eventually(move || !c.lock().unwrap().is_empty()).await;
    assert_eq!(
        chats.lock().unwrap()[0],
        (Sender::Peer(PeerId::new("bob")), "gg".to_string())
    );
}

#[tokio::test]
async fn test_send_move_updates_roster_of_other_peer() {
    let relay = MemoryRelay::start();
    let alice = online(&relay, "alice").await;
    let bob = online(&relay, "bob").await;
    alice.host_game("alpha", "training_ground", None).await.unwrap();
    bob.join_game("alpha").await.unwrap();
    settle().await;

    bob.send_move(Vec3::new(3.0, 0.0, 4.0), Vec3::ZERO).unwrap();

    let a = Arc::clone(&alice);
    eventually(move || {
        a.roster()
            .get(&PeerId::new("bob"))
            .is_some_and(|p| p.position == Vec3::new(3.0, 0.0, 4.0))
    })
    .await;
}

// =========================================================================
// Leaving
// =========================================================================

#[tokio::test]
async fn test_leave_game_stops_simulation_and_clears_session_state() {
    let relay = MemoryRelay::start();
    let alice = online(&relay, "alice").await;
    alice.host_game("alpha", "training_ground", None).await.unwrap();
    let (fires, fire_count) = counter();
    alice.router().channels().on_fire.add(move |_| {
        fires.fetch_add(1, Ordering::SeqCst);
    });

    alice.leave_game();

    assert_eq!(alice.session().phase(), SessionPhase::Idle);
    assert!(!alice.server().is_running());
    assert!(alice.roster().is_empty());
    assert!(alice.provider().current_room().is_none());
    assert!(alice.connection().is_connected());

    // The next game still routes; the old observer is gone.
    let a = Arc::clone(&alice);
    eventually(move || a.connection().state().can_enter_room()).await;
    alice.host_game("beta", "docks", None).await.unwrap();
    let (fresh, fresh_count) = counter();
    alice.router().channels().on_fire.add(move |_| {
        fresh.fetch_add(1, Ordering::SeqCst);
    });
    alice.fire("Pistol", Vec3::ZERO, forward()).unwrap();

    assert_eq!(fresh_count(), 1);
    assert_eq!(fire_count(), 0);
}

#[tokio::test]
async fn test_reset_observers_keeps_host_simulation_fed() {
    let relay = MemoryRelay::start();
    let alice = online(&relay, "alice").await;
    alice.host_game("alpha", "training_ground", None).await.unwrap();

    alice.reset_observers();
    let (fires, fire_count) = counter();
    alice.router().channels().on_fire.add(move |_| {
        fires.fetch_add(1, Ordering::SeqCst);
    });
    alice.fire("Pistol", Vec3::ZERO, forward()).unwrap();

    assert_eq!(fire_count(), 1);
}

// =========================================================================
// Reconnect
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_default_client_reconnects_as_same_peer() {
    let relay = MemoryRelay::start();
    let alice = NetworkClient::builder(relay.provider()).build();
    common::spawn_pump(&alice);
    assert!(alice.connect("alice").await);
    let a = Arc::clone(&alice);
    eventually(move || a.connection().state() == ConnectionState::InLobby).await;

    relay.drop_connection(&PeerId::new("alice"));
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(alice.connection().state(), ConnectionState::InLobby);
    assert_eq!(alice.local_peer(), Some(PeerId::new("alice")));
}
