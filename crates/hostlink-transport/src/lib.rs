//! Relay transport abstraction for Hostlink.
//!
//! The relay is a black box that gives us rooms, actors, a master-client
//! flag and fire-and-forget event publishing. Everything above this crate
//! talks to it through the [`TransportProvider`] trait, so a Photon-style
//! SDK binding and the bundled [`MemoryRelay`] are interchangeable.
//!
//! # Feature Flags
//!
//! - `memory` (default): in-process relay used by tests and demos

mod error;
#[cfg(feature = "memory")]
mod memory;
mod state;

pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{MemoryProvider, MemoryRelay, RelayConfig};
pub use state::{ConnectionState, RelayState};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Identity of a peer on the relay (the user id it connected with).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Creates a new `PeerId`.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A member of the current room as the relay reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Peer identity.
    pub id: PeerId,
    /// Display name.
    pub name: String,
    /// Relay-assigned join ordinal, starting at 1.
    pub actor_nr: u32,
}

/// A room as it appears in the lobby listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Relay room id (equal to the room name).
    pub id: String,
    /// Room name.
    pub name: String,
    /// Actors currently inside.
    pub player_count: usize,
    /// Maximum actors allowed.
    pub max_players: usize,
    /// Whether the room accepts joins.
    pub is_open: bool,
    /// Only the properties listed in the lobby.
    #[serde(default)]
    pub custom_properties: HashMap<String, serde_json::Value>,
}

/// Options for creating a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRoomOptions {
    pub max_players: usize,
    pub is_visible: bool,
    pub is_open: bool,
    pub custom_properties: HashMap<String, serde_json::Value>,
    /// Property keys exposed in the lobby listing.
    pub props_listed_in_lobby: Vec<String>,
    /// How long the relay keeps the room alive once it is empty.
    /// `None` removes it as soon as the last actor leaves.
    pub empty_room_ttl: Option<Duration>,
}

impl Default for CreateRoomOptions {
    fn default() -> Self {
        Self {
            max_players: 8,
            is_visible: true,
            is_open: true,
            custom_properties: HashMap::new(),
            props_listed_in_lobby: Vec::new(),
            empty_room_ttl: None,
        }
    }
}

/// Which actors of the room receive a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReceiverGroup {
    /// Everyone except the sender.
    #[default]
    Others,
    /// Everyone including the sender.
    All,
    /// Only the current master client.
    MasterClient,
}

/// Delivery options for [`TransportProvider::send_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendOptions {
    /// Reliable events are retransmitted by the relay until delivered.
    /// Unreliable ones (periodic position updates) are fire-and-forget.
    pub reliable: bool,
    pub receivers: ReceiverGroup,
}

/// A push notification from the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportNotification {
    /// The normalized connection state changed.
    StateChanged(ConnectionState),
    /// The lobby room listing changed.
    RoomListUpdated(Vec<RoomInfo>),
    /// A game event published by a room member.
    Event {
        code: u8,
        data: Vec<u8>,
        sender: PeerId,
    },
    /// An actor entered the current room.
    PlayerJoined(Actor),
    /// An actor left the current room.
    PlayerLeft(PeerId),
    /// The relay elected a new master client.
    MasterClientSwitched(PeerId),
}

/// The relay operations the network layer depends on.
///
/// Async operations return `Send` futures so callers can drive them from
/// spawned tasks (the reconnect timer does).
pub trait TransportProvider: Send + Sync + 'static {
    /// Connects to the relay under the given user id.
    fn connect(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Drops the relay connection, leaving any room.
    fn disconnect(&self);

    /// Creates a room and joins it as master client.
    fn create_room(
        &self,
        name: &str,
        options: CreateRoomOptions,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Joins an existing room.
    fn join_room(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Leaves the current room but stays connected.
    fn leave_room(&self);

    /// Fetches the current lobby listing.
    fn room_list(
        &self,
    ) -> impl Future<Output = Result<Vec<RoomInfo>, TransportError>> + Send;

    /// Asks the relay to push a fresh listing as
    /// [`TransportNotification::RoomListUpdated`].
    fn refresh_room_list(&self) {}

    /// Publishes an event to the current room.
    fn send_event(
        &self,
        code: u8,
        data: &[u8],
        options: SendOptions,
    ) -> Result<(), TransportError>;

    fn local_player_id(&self) -> Option<PeerId>;

    /// Relay clock in milliseconds.
    fn server_time(&self) -> u64;

    /// Whether the relay currently designates this peer as master client.
    fn is_master_client(&self) -> bool;

    /// Actors of the current room keyed by peer id.
    fn actors(&self) -> BTreeMap<PeerId, Actor>;

    fn current_room(&self) -> Option<String>;

    /// Reads a custom property of the current room.
    fn room_property(&self, key: &str) -> Option<serde_json::Value>;

    /// Subscribes to push notifications.
    fn subscribe(&self) -> broadcast::Receiver<TransportNotification>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_display_and_as_str() {
        let id = PeerId::new("alice");
        assert_eq!(id.to_string(), "alice");
        assert_eq!(id.as_str(), "alice");
    }

    #[test]
    fn test_peer_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PeerId::new("bob")).unwrap();
        assert_eq!(json, "\"bob\"");
    }

    #[test]
    fn test_receiver_group_default_is_others() {
        assert_eq!(ReceiverGroup::default(), ReceiverGroup::Others);
        assert!(!SendOptions::default().reliable);
    }

    #[test]
    fn test_create_room_options_default_is_open_and_visible() {
        let opts = CreateRoomOptions::default();
        assert!(opts.is_open);
        assert!(opts.is_visible);
        assert!(opts.empty_room_ttl.is_none());
    }
}
