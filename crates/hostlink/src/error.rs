//! Unified error type for Hostlink.

use hostlink_authority::{DispatchError, SimulationError};
use hostlink_protocol::ProtocolError;
use hostlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Room and connection operations report failure as `false`; this type
/// only carries what the layer actually propagates: payload encoding,
/// relay publishes and simulation startup.
#[derive(Debug, thiserror::Error)]
pub enum HostlinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A typed send failed to encode or publish.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The local simulation could not be started.
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}
