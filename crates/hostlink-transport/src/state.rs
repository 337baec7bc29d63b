//! Connection states: the relay's own codes and the normalized view.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized connection state seen by the rest of the network layer.
///
/// ```text
/// Disconnected → Connecting → ConnectedToMaster → InLobby ⇄ InRoom
///       ↑                                                     │
///       └──────────── Error / Disconnected ←──────────────────┘
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    ConnectedToMaster,
    InLobby,
    InRoom,
    Error,
}

impl ConnectionState {
    /// Disconnected or Error: the only states a connect may start from.
    pub fn is_down(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }

    /// States in which rooms may be created or joined.
    pub fn can_enter_room(&self) -> bool {
        matches!(self, Self::ConnectedToMaster | Self::InLobby)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::ConnectedToMaster => "ConnectedToMaster",
            Self::InLobby => "InLobby",
            Self::InRoom => "InRoom",
            Self::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Raw client states as a Photon-style load-balancing relay reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayState {
    Uninitialized,
    ConnectingToNameServer,
    ConnectedToNameServer,
    ConnectingToMasterServer,
    ConnectedToMaster,
    JoinedLobby,
    ConnectingToGameServer,
    Joined,
    Leaving,
    Disconnecting,
    Disconnected,
    Error,
}

impl From<RelayState> for ConnectionState {
    fn from(state: RelayState) -> Self {
        match state {
            RelayState::Uninitialized | RelayState::Disconnected => {
                ConnectionState::Disconnected
            }
            RelayState::ConnectingToNameServer
            | RelayState::ConnectedToNameServer
            | RelayState::ConnectingToMasterServer
            | RelayState::ConnectingToGameServer
            | RelayState::Leaving
            | RelayState::Disconnecting => ConnectionState::Connecting,
            RelayState::ConnectedToMaster => ConnectionState::ConnectedToMaster,
            RelayState::JoinedLobby => ConnectionState::InLobby,
            RelayState::Joined => ConnectionState::InRoom,
            RelayState::Error => ConnectionState::Error,
        }
    }
}
