//! Connection lifecycle for Hostlink.
//!
//! This crate owns two things:
//!
//! 1. **State tracking**: the normalized [`ConnectionState`] published on a
//!    `watch` channel, driven only by relay notifications.
//! 2. **Reconnection**: a [`ReconnectPolicy`] that schedules a delayed
//!    reconnect whenever the link drops, unless the user asked to leave.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Manager (above)   ← gates room operations on the current state
//!     ↕
//! Connection Manager (this crate)
//!     ↕
//! Transport Provider (below)  ← connect / disconnect / state notifications
//! ```
//!
//! [`ConnectionState`]: hostlink_transport::ConnectionState

mod manager;
mod policy;

pub use manager::ConnectionManager;
pub use policy::{ReconnectPolicy, UserIdResolver};
