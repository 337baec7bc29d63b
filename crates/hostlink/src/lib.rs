//! # Hostlink
//!
//! Client-hosted authoritative networking over a Photon-style relay.
//!
//! One peer in a room, the master client, runs the game simulation
//! locally; everyone else is a thin client that sends requests and renders
//! the facts the host broadcasts. When the host drops, the relay elects a
//! new master and that peer takes over the simulation from its roster.
//!
//! The pieces live in their own crates and are re-exported here:
//!
//! - [`transport`]: the relay contract and the in-memory relay
//! - [`protocol`]: event codes, kinds and payloads
//! - [`connection`]: connection state and reconnect policy
//! - [`room`]: room create/join/leave and lobby listing
//! - [`router`]: inbound routing, observers and the roster
//! - [`authority`]: outbound dispatch and the local simulation
//!
//! [`NetworkClient`] wires them together.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hostlink::prelude::*;
//!
//! # async fn demo() -> Result<(), HostlinkError> {
//! let relay = MemoryRelay::start();
//! let client = NetworkClient::builder(relay.provider()).build();
//!
//! client.connect("alice").await;
//! client.process_pending();
//! client.host_game("alpha", "training_ground", None).await?;
//! client.fire("Pistol", Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0))?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod logging;
mod session;

pub use client::{NetworkClient, NetworkClientBuilder, SimulationBuilder};
pub use error::HostlinkError;
pub use logging::init_tracing;
pub use session::{NetworkSession, SessionPhase};

pub use hostlink_authority as authority;
pub use hostlink_connection as connection;
pub use hostlink_protocol as protocol;
pub use hostlink_room as room;
pub use hostlink_router as router;
pub use hostlink_transport as transport;

/// The types most applications need.
pub mod prelude {
    pub use crate::{HostlinkError, NetworkClient, NetworkSession, SessionPhase, init_tracing};
    pub use hostlink_authority::{
        AuthoritativeSimulation, LogicalServerConfig, SimulationError, SimulationParams,
    };
    pub use hostlink_connection::ReconnectPolicy;
    pub use hostlink_protocol::{
        EventCode, EventKind, GameEvent, InboundEvent, PeerId, PlayerState, Sender, Vec3,
    };
    pub use hostlink_room::RoomConfig;
    pub use hostlink_router::{ObserverScope, Received};
    pub use hostlink_transport::{ConnectionState, MemoryRelay, TransportProvider};
}
