//! Inbound side of Hostlink: event routing and the player roster.
//!
//! - [`NetworkEventRouter`] takes every inbound event (relayed or looped
//!   back locally), applies roster side effects, and fans out to typed
//!   observer channels.
//! - [`PlayerStateManager`] is the roster those side effects write to.
//! - [`Observable`] is the observer list both are built on.

mod observable;
mod roster;
mod router;

pub use observable::{Observable, ObserverId};
pub use roster::PlayerStateManager;
pub use router::{
    DEFAULT_MOVE_TOLERANCE, EventHandler, NetworkEventRouter, ObserverScope,
    Received, RouterChannels,
};
