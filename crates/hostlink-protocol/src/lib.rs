//! Event vocabulary for Hostlink.
//!
//! This crate defines what peers say to each other over the relay:
//!
//! - **Codes** ([`EventCode`], [`EventKind`], [`classify`]): the numeric
//!   event table and the request / authority / system split.
//! - **Payloads** ([`FireRequest`], [`HitConfirmed`], [`GameEvent`], ...):
//!   the typed body carried under each code.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how payloads become the
//!   opaque byte buffers the relay moves.
//! - **Types** ([`PlayerState`], [`Vec3`], [`InboundEvent`], [`Sender`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (code, bytes) → Protocol (GameEvent) → Router / Authority
//! ```
//!
//! Nothing here knows about connections or rooms.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod code;
mod codec;
mod error;
mod payload;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use code::{EventCode, EventKind, classify};
pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use payload::{
    ChatMessage, FireRequest, GameEvent, HitConfirmed, HitRequest, InitialState,
    InitialStateRequest, MapSync, PlayerDied, PlayerMove, PlayerRespawned,
    ReloadConfirmed, ReloadRequest, RespawnRequest, ShotFired, UpgradeApplied,
    UpgradeOffer, UpgradeSelection, WavePhase, WaveState, WeaponChanged,
    WeaponSync,
};
pub use types::{InboundEvent, PlayerState, Sender, Vec3};

pub use hostlink_transport::PeerId;
