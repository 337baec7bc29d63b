//! Error types for the authority layer.

use hostlink_protocol::ProtocolError;
use hostlink_transport::TransportError;

/// Errors from the typed dispatch wrappers.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The payload could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The relay refused the publish.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors raised by an authoritative simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// The simulation could not be built or refused to start.
    #[error("simulation failed to start: {0}")]
    StartFailed(String),

    /// The simulation needs a room and the local peer is not in one.
    #[error("not in a room")]
    NotInRoom,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<DispatchError> for SimulationError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::Protocol(e) => SimulationError::Protocol(e),
            DispatchError::Transport(e) => SimulationError::Transport(e),
        }
    }
}
