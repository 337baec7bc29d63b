//! Three peers on an in-memory relay. Alice hosts, Bob and Carol join,
//! they trade a few shots, then Alice drops and Bob takes over.
//!
//! Run with `RUST_LOG=hostlink=debug` for the full event trace.

use std::sync::Arc;
use std::time::Duration;

use hostlink::prelude::*;
use hostlink::transport::MemoryProvider;

type Client = Arc<NetworkClient<MemoryProvider>>;

// ---------------------------------------------------------------------------
// Peers
// ---------------------------------------------------------------------------

async fn join_relay(relay: &MemoryRelay, user: &str) -> Client {
    let client = NetworkClient::builder(relay.provider())
        .room_config(RoomConfig {
            max_players: 4,
            ..RoomConfig::default()
        })
        .build();

    let pump = Arc::clone(&client);
    tokio::spawn(async move { pump.run().await });

    let name = user.to_string();
    client.router().channels().on_hit.add(move |hit| {
        tracing::info!(
            peer = %name,
            attacker = %hit.attacker,
            target = %hit.target,
            health = hit.health,
            "hit confirmed"
        );
    });
    let name = user.to_string();
    client.router().channels().on_death.add(move |died| {
        tracing::info!(peer = %name, victim = %died.victim, "player died");
    });
    let name = user.to_string();
    client.router().channels().on_initial_state.add(move |state| {
        tracing::info!(peer = %name, players = state.players.len(), wave = state.wave, "snapshot");
    });

    if !client.connect(user).await {
        tracing::warn!(peer = user, "connect refused");
    }
    settle().await;
    client
}

/// Lets relay traffic land before the next step.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn forward() -> Vec3 {
    Vec3::new(0.0, 0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), HostlinkError> {
    init_tracing("hostlink=info,host_migration=info");

    let relay = MemoryRelay::start();
    let alice = join_relay(&relay, "alice").await;
    let bob = join_relay(&relay, "bob").await;
    let carol = join_relay(&relay, "carol").await;

    if !alice.host_game("outpost", "training_ground", Some("waves")).await? {
        tracing::error!("alice could not create the room");
        return Ok(());
    }
    for peer in [&bob, &carol] {
        if !peer.join_game("outpost").await? {
            tracing::error!("join failed");
            return Ok(());
        }
    }
    settle().await;
    tracing::info!(map = ?bob.map_id(), "everyone is in");

    // Round one, refereed by Alice.
    let carol_id = PeerId::new("carol");
    bob.fire("Pistol", Vec3::ZERO, forward())?;
    bob.hit(&carol_id, "Pistol", 40.0, false)?;
    alice.server().advance_wave()?;
    settle().await;

    // Alice's network goes away mid-game.
    tracing::info!("dropping the host");
    relay.drop_connection(&PeerId::new("alice"));
    settle().await;
    tracing::info!(
        bob_hosting = bob.server().is_running(),
        bob_master = bob.is_master(),
        "after migration"
    );

    // Round two, refereed by Bob.
    carol.switch_weapon("Rifle")?;
    settle().await;
    carol.fire("Rifle", Vec3::ZERO, forward())?;
    bob.hit(&carol_id, "Pistol", 60.0, false)?;
    settle().await;
    carol.request_respawn()?;
    settle().await;

    for player in bob.roster().snapshot() {
        tracing::info!(
            player = %player.id,
            health = player.health,
            weapon = %player.weapon_id,
            dead = player.is_dead,
            "final roster"
        );
    }

    carol.leave_game();
    bob.leave_game();
    Ok(())
}
