//! Room management for Hostlink.
//!
//! A room is the relay's unit of play: a named group of actors, one of
//! which is master client. This crate wraps the relay's room operations
//! with connection-state gating and keeps the lobby listing current.
//!
//! ```text
//! Session Service (above)  ← host_game / join_game / leave_game
//!     ↕
//! Room Manager (this crate)
//!     ↕
//! Connection Manager + Transport Provider (below)
//! ```

mod config;
mod manager;

pub use config::{MAP_ID_KEY, RoomConfig};
pub use manager::RoomManager;
