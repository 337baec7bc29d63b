//! Event codes and their kind classification.
//!
//! Every numeric code on the wire belongs to exactly one [`EventKind`]:
//!
//! - **Request**: a client asks the authority to do something (fire,
//!   reload). Nothing is true until the authoritative simulation says so.
//! - **Authority**: a fact the simulation has already validated. It is
//!   broadcast to every peer and replayed locally by the host itself.
//! - **System**: informational traffic with no special host routing
//!   (positions, map sync, chat).
//!
//! Getting this wrong is expensive in both directions: a request treated as
//! a fact skips validation, and a fact treated as a request is simulated
//! twice. The classification is therefore a static table built at compile
//! time from the exhaustive [`EventCode::kind`] match, not per-call logic.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// The three event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Request,
    Authority,
    System,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Request => "request",
            Self::Authority => "authority",
            Self::System => "system",
        };
        f.write_str(s)
    }
}

/// Every event code known to the network layer.
///
/// The discriminant is the byte sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventCode {
    // -- Requests (client → master) --
    Fire = 1,
    Hit = 2,
    Reload = 3,
    SyncWeapon = 4,
    RequestRespawn = 5,
    RequestInitialState = 6,
    SelectUpgrade = 7,

    // -- Authority facts (master → everyone) --
    FireConfirmed = 20,
    HitConfirmed = 21,
    PlayerDied = 22,
    PlayerRespawned = 23,
    ReloadConfirmed = 24,
    WeaponChanged = 25,
    InitialState = 26,
    WaveState = 27,
    UpgradeOffer = 28,
    UpgradeApplied = 29,

    // -- System --
    PlayerMove = 40,
    MapSync = 41,
    Chat = 42,
}

impl EventCode {
    /// All codes, in wire order.
    pub const ALL: [EventCode; 20] = [
        EventCode::Fire,
        EventCode::Hit,
        EventCode::Reload,
        EventCode::SyncWeapon,
        EventCode::RequestRespawn,
        EventCode::RequestInitialState,
        EventCode::SelectUpgrade,
        EventCode::FireConfirmed,
        EventCode::HitConfirmed,
        EventCode::PlayerDied,
        EventCode::PlayerRespawned,
        EventCode::ReloadConfirmed,
        EventCode::WeaponChanged,
        EventCode::InitialState,
        EventCode::WaveState,
        EventCode::UpgradeOffer,
        EventCode::UpgradeApplied,
        EventCode::PlayerMove,
        EventCode::MapSync,
        EventCode::Chat,
    ];

    /// The kind this code belongs to.
    pub const fn kind(self) -> EventKind {
        match self {
            EventCode::Fire
            | EventCode::Hit
            | EventCode::Reload
            | EventCode::SyncWeapon
            | EventCode::RequestRespawn
            | EventCode::RequestInitialState
            | EventCode::SelectUpgrade => EventKind::Request,

            EventCode::FireConfirmed
            | EventCode::HitConfirmed
            | EventCode::PlayerDied
            | EventCode::PlayerRespawned
            | EventCode::ReloadConfirmed
            | EventCode::WeaponChanged
            | EventCode::InitialState
            | EventCode::WaveState
            | EventCode::UpgradeOffer
            | EventCode::UpgradeApplied => EventKind::Authority,

            EventCode::PlayerMove | EventCode::MapSync | EventCode::Chat => {
                EventKind::System
            }
        }
    }

    /// The wire byte.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Looks up a wire byte. `None` for codes outside the table.
    pub fn from_u8(code: u8) -> Option<Self> {
        CODE_TABLE[code as usize]
    }

    /// Unreliable delivery is reserved for high-frequency position updates.
    pub const fn default_reliable(self) -> bool {
        !matches!(self, EventCode::PlayerMove)
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.as_u8())
    }
}

impl TryFrom<u8> for EventCode {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        EventCode::from_u8(code).ok_or(ProtocolError::UnknownCode(code))
    }
}

impl From<EventCode> for u8 {
    fn from(code: EventCode) -> Self {
        code.as_u8()
    }
}

// ---------------------------------------------------------------------------
// Static lookup tables
// ---------------------------------------------------------------------------

static CODE_TABLE: [Option<EventCode>; 256] = build_code_table();
static KIND_TABLE: [Option<EventKind>; 256] = build_kind_table();

const fn build_code_table() -> [Option<EventCode>; 256] {
    let mut table = [None; 256];
    let mut i = 0;
    while i < EventCode::ALL.len() {
        let code = EventCode::ALL[i];
        table[code as usize] = Some(code);
        i += 1;
    }
    table
}

const fn build_kind_table() -> [Option<EventKind>; 256] {
    let mut table = [None; 256];
    let mut i = 0;
    while i < EventCode::ALL.len() {
        let code = EventCode::ALL[i];
        table[code as usize] = Some(code.kind());
        i += 1;
    }
    table
}

/// Classifies a raw wire code. `None` means the code is unknown.
pub fn classify(code: u8) -> Option<EventKind> {
    KIND_TABLE[code as usize]
}
