//! Room operations gated on connection state, plus the cached lobby list.

use std::sync::Arc;

use hostlink_connection::ConnectionManager;
use hostlink_transport::{RoomInfo, TransportProvider};
use tokio::sync::watch;

use crate::{MAP_ID_KEY, RoomConfig};

/// Creates, joins and leaves relay rooms.
///
/// Room operations only run from `ConnectedToMaster` or `InLobby`; from any
/// other state they return `false` without touching the relay. Relay
/// failures also come back as `false`, never as errors.
pub struct RoomManager<P> {
    connection: Arc<ConnectionManager<P>>,
    config: RoomConfig,
    rooms_tx: watch::Sender<Vec<RoomInfo>>,
}

impl<P: TransportProvider> RoomManager<P> {
    pub fn new(connection: Arc<ConnectionManager<P>>, config: RoomConfig) -> Self {
        let (rooms_tx, _) = watch::channel(Vec::new());
        Self {
            connection,
            config,
            rooms_tx,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    fn provider(&self) -> &P {
        self.connection.provider()
    }

    /// Creates `name` on `map_id` and joins it as master client.
    pub async fn create_room(&self, name: &str, map_id: &str) -> bool {
        let state = self.connection.state();
        if !state.can_enter_room() {
            tracing::warn!(room = name, %state, "cannot create room in this state");
            return false;
        }

        let options = self.config.create_options(map_id);
        match self.provider().create_room(name, options).await {
            Ok(()) => self.confirm_in_room(name),
            Err(error) => {
                tracing::warn!(room = name, %error, "room creation failed");
                false
            }
        }
    }

    /// Joins an existing room.
    pub async fn join_room(&self, name: &str) -> bool {
        let state = self.connection.state();
        if !state.can_enter_room() {
            tracing::warn!(room = name, %state, "cannot join room in this state");
            return false;
        }

        match self.provider().join_room(name).await {
            Ok(()) => self.confirm_in_room(name),
            Err(error) => {
                tracing::warn!(room = name, %error, "room join failed");
                false
            }
        }
    }

    /// The connection can drop while a create or join is awaiting the relay.
    fn confirm_in_room(&self, name: &str) -> bool {
        if self.provider().current_room().as_deref() == Some(name) {
            tracing::info!(room = name, "entered room");
            true
        } else {
            tracing::warn!(room = name, "room entered but lost before completion");
            false
        }
    }

    /// Leaves the current room. Stays connected to the relay.
    pub fn leave_room(&self) {
        match self.provider().current_room() {
            Some(room) => {
                self.provider().leave_room();
                tracing::info!(%room, "left room");
            }
            None => tracing::debug!("leave_room outside a room, ignoring"),
        }
    }

    pub fn current_room(&self) -> Option<String> {
        self.provider().current_room()
    }

    pub fn is_in_room(&self) -> bool {
        self.current_room().is_some()
    }

    /// The current room's map id. `None` outside a room or when the property
    /// is missing or not a string.
    pub fn map_id(&self) -> Option<String> {
        self.provider()
            .room_property(MAP_ID_KEY)
            .and_then(|value| value.as_str().map(str::to_owned))
    }

    // -----------------------------------------------------------------------
    // Lobby listing
    // -----------------------------------------------------------------------

    /// Asks the relay to push a fresh listing.
    pub fn refresh_room_list(&self) {
        self.provider().refresh_room_list();
    }

    /// Pulls the listing from the relay and caches it. Falls back to the
    /// cached listing when the relay cannot answer.
    pub async fn room_list(&self) -> Vec<RoomInfo> {
        match self.provider().room_list().await {
            Ok(rooms) => {
                self.handle_room_list(rooms.clone());
                rooms
            }
            Err(error) => {
                tracing::warn!(%error, "room list unavailable, using cached listing");
                self.cached_room_list()
            }
        }
    }

    /// Stores a listing pushed by the relay.
    pub fn handle_room_list(&self, rooms: Vec<RoomInfo>) {
        tracing::debug!(count = rooms.len(), "room list updated");
        self.rooms_tx.send_replace(rooms);
    }

    /// Watches listing changes.
    pub fn room_list_updates(&self) -> watch::Receiver<Vec<RoomInfo>> {
        self.rooms_tx.subscribe()
    }

    pub fn cached_room_list(&self) -> Vec<RoomInfo> {
        self.rooms_tx.borrow().clone()
    }
}
