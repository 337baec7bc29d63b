//! Room creation settings.

use std::collections::HashMap;
use std::time::Duration;

use hostlink_transport::CreateRoomOptions;
use serde::{Deserialize, Serialize};

/// Room property holding the map id. Listed in the lobby.
pub const MAP_ID_KEY: &str = "mapId";

/// Settings applied to every room this client creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Maximum players allowed in the room.
    pub max_players: usize,

    /// Whether the room shows up in lobby listings.
    pub is_visible: bool,

    /// Whether the room accepts joins.
    pub is_open: bool,

    /// How long the relay keeps an empty room alive. A room that outlives
    /// its last player can be rejoined, and the first peer back becomes
    /// master.
    pub empty_room_ttl: Option<Duration>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: 8,
            is_visible: true,
            is_open: true,
            empty_room_ttl: None,
        }
    }
}

impl RoomConfig {
    /// Relay options for a new room on `map_id`.
    pub fn create_options(&self, map_id: &str) -> CreateRoomOptions {
        let mut custom_properties = HashMap::new();
        custom_properties.insert(
            MAP_ID_KEY.to_string(),
            serde_json::Value::String(map_id.to_string()),
        );
        CreateRoomOptions {
            max_players: self.max_players,
            is_visible: self.is_visible,
            is_open: self.is_open,
            custom_properties,
            props_listed_in_lobby: vec![MAP_ID_KEY.to_string()],
            empty_room_ttl: self.empty_room_ttl,
        }
    }
}
