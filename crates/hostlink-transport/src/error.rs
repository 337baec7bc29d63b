/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The operation needs a connection to the relay.
    #[error("not connected to the relay")]
    NotConnected,

    /// The relay refused or could not be reached.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The operation needs the peer to be inside a room.
    #[error("not in a room")]
    NotInRoom,

    /// The peer is already inside a room.
    #[error("already in room {0}")]
    AlreadyInRoom(String),

    /// No room with this name exists.
    #[error("room {0} not found")]
    RoomNotFound(String),

    /// A room with this name already exists.
    #[error("room {0} already exists")]
    RoomAlreadyExists(String),

    /// The room has no free actor slot.
    #[error("room {0} is full")]
    RoomFull(String),

    /// The room exists but does not accept joins.
    #[error("room {0} is closed")]
    RoomClosed(String),

    /// The relay was shut down.
    #[error("relay shut down")]
    Shutdown,
}
