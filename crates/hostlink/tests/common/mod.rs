//! Peers on a shared in-memory relay, each with its notification pump.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hostlink::NetworkClient;
use hostlink::connection::ReconnectPolicy;
use hostlink::protocol::{EventCode, InboundEvent};
use hostlink::room::RoomConfig;
use hostlink::transport::{ConnectionState, MemoryProvider, MemoryRelay};

pub type Client = Arc<NetworkClient<MemoryProvider>>;

pub async fn online(relay: &MemoryRelay, user: &str) -> Client {
    online_with(relay, user, RoomConfig::default()).await
}

pub async fn online_with(relay: &MemoryRelay, user: &str, config: RoomConfig) -> Client {
    let client = NetworkClient::builder(relay.provider())
        .reconnect_policy(ReconnectPolicy::disabled())
        .room_config(config)
        .build();
    spawn_pump(&client);
    assert!(client.connect(user).await);
    let c = Arc::clone(&client);
    eventually(move || c.connection().state() == ConnectionState::InLobby).await;
    client
}

pub fn spawn_pump(client: &Client) {
    let pump = Arc::clone(client);
    tokio::spawn(async move { pump.run().await });
}

/// Polls `condition` until it holds, failing after a second.
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Lets in-flight relay traffic land.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize + Clone) {
    let count = Arc::new(AtomicUsize::new(0));
    let read = Arc::clone(&count);
    (count, move || read.load(Ordering::SeqCst))
}

/// Every raw event of `code` the client's router sees.
pub fn record_raw(client: &Client, code: EventCode) -> Arc<Mutex<Vec<InboundEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client.router().on_raw_event().add(move |event: &InboundEvent| {
        if event.code == code.as_u8() {
            sink.lock().unwrap().push(event.clone());
        }
    });
    seen
}
