//! Shared value types: positions, player state, and inbound event envelopes.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};

use crate::{Codec, EventKind, GameEvent, PeerId, ProtocolError, classify};

// ---------------------------------------------------------------------------
// Vec3
// ---------------------------------------------------------------------------

/// A position or Euler rotation in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

// ---------------------------------------------------------------------------
// PlayerState
// ---------------------------------------------------------------------------

/// One entry of the player roster.
///
/// Health always stays within `0.0..=MAX_HEALTH`; use [`set_health`]
/// rather than writing the field directly. Decoding clamps it as well.
///
/// [`set_health`]: PlayerState::set_health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub id: PeerId,
    pub name: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub weapon_id: String,
    #[serde(deserialize_with = "clamped_health")]
    pub health: f32,
    pub is_dead: bool,
}

impl PlayerState {
    pub const MAX_HEALTH: f32 = 100.0;
    pub const DEFAULT_WEAPON: &'static str = "Pistol";

    /// A freshly spawned player at the origin with full health.
    pub fn new(id: PeerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            weapon_id: Self::DEFAULT_WEAPON.to_string(),
            health: Self::MAX_HEALTH,
            is_dead: false,
        }
    }

    /// Sets health, clamped to `0.0..=MAX_HEALTH`. NaN counts as zero.
    pub fn set_health(&mut self, health: f32) {
        self.health = clamp_health(health);
    }
}

fn clamp_health(health: f32) -> f32 {
    if health.is_nan() {
        0.0
    } else {
        health.clamp(0.0, PlayerState::MAX_HEALTH)
    }
}

fn clamped_health<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    f32::deserialize(deserializer).map(clamp_health)
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Where an inbound event came from.
///
/// `LocalAuthority` marks the host's own authority broadcasts fed back into
/// its local pipeline. It is a separate variant so it can never collide
/// with a real peer id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sender {
    Peer(PeerId),
    LocalAuthority,
}

impl Sender {
    /// The peer id, if this came from a peer.
    pub fn peer(&self) -> Option<&PeerId> {
        match self {
            Sender::Peer(id) => Some(id),
            Sender::LocalAuthority => None,
        }
    }

    pub fn is_local_authority(&self) -> bool {
        matches!(self, Sender::LocalAuthority)
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::Peer(id) => write!(f, "{id}"),
            Sender::LocalAuthority => f.write_str("<local-authority>"),
        }
    }
}

impl From<PeerId> for Sender {
    fn from(id: PeerId) -> Self {
        Sender::Peer(id)
    }
}

// ---------------------------------------------------------------------------
// InboundEvent
// ---------------------------------------------------------------------------

/// An event as it reaches the router: from the relay or from local loopback.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub code: u8,
    pub data: Vec<u8>,
    pub sender: Sender,
}

impl InboundEvent {
    pub fn new(code: u8, data: Vec<u8>, sender: Sender) -> Self {
        Self { code, data, sender }
    }

    /// Kind of this event's code, `None` for unknown codes.
    pub fn kind(&self) -> Option<EventKind> {
        classify(self.code)
    }

    /// Decodes the body into the payload variant for its code.
    pub fn decode<C: Codec>(&self, codec: &C) -> Result<GameEvent, ProtocolError> {
        GameEvent::decode(self.code, &self.data, codec)
    }

    /// Decodes the body as a specific payload type.
    pub fn payload<T: DeserializeOwned, C: Codec>(
        &self,
        codec: &C,
    ) -> Result<T, ProtocolError> {
        codec.decode(&self.data)
    }
}
