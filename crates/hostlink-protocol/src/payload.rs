//! Typed payloads, one per event code, and the [`GameEvent`] union.
//!
//! Field names go on the wire in camelCase so the browser client can read
//! them without a mapping layer.

use serde::{Deserialize, Serialize};

use crate::{Codec, EventCode, EventKind, PeerId, PlayerState, ProtocolError, Vec3};

// ---------------------------------------------------------------------------
// Requests (client → master)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FireRequest {
    pub weapon_id: String,
    pub origin: Vec3,
    pub direction: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitRequest {
    pub target: PeerId,
    pub weapon_id: String,
    pub damage: f32,
    #[serde(default)]
    pub headshot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadRequest {
    pub weapon_id: String,
}

/// The sender switched to another weapon and asks the host to confirm it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponSync {
    pub weapon_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RespawnRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InitialStateRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeSelection {
    pub upgrade_id: String,
}

// ---------------------------------------------------------------------------
// Authority facts (master → everyone)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotFired {
    pub shooter: PeerId,
    pub weapon_id: String,
    pub origin: Vec3,
    pub direction: Vec3,
    /// Rounds left in the magazine after this shot.
    pub ammo: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitConfirmed {
    pub attacker: PeerId,
    pub target: PeerId,
    pub weapon_id: String,
    pub damage: f32,
    /// Target health after the hit.
    pub health: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDied {
    pub victim: PeerId,
    #[serde(default)]
    pub killer: Option<PeerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRespawned {
    pub player: PeerId,
    pub position: Vec3,
    pub health: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadConfirmed {
    pub player: PeerId,
    pub weapon_id: String,
    pub ammo: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponChanged {
    pub player: PeerId,
    pub weapon_id: String,
}

/// Full snapshot sent to late joiners and after a host takeover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialState {
    pub players: Vec<PlayerState>,
    pub wave: u32,
    #[serde(default)]
    pub map_id: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WavePhase {
    Spawning,
    Active,
    Intermission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveState {
    pub wave: u32,
    pub phase: WavePhase,
    pub enemies_remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeOffer {
    pub player: PeerId,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeApplied {
    pub player: PeerId,
    pub upgrade_id: String,
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMove {
    pub position: Vec3,
    pub rotation: Vec3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSync {
    pub map_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: String,
}

// ---------------------------------------------------------------------------
// GameEvent
// ---------------------------------------------------------------------------

/// Every payload the network layer knows, tagged by its event code.
///
/// The variant determines the code, so a payload can never be published
/// under the wrong one.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Fire(FireRequest),
    Hit(HitRequest),
    Reload(ReloadRequest),
    SyncWeapon(WeaponSync),
    RequestRespawn(RespawnRequest),
    RequestInitialState(InitialStateRequest),
    SelectUpgrade(UpgradeSelection),

    FireConfirmed(ShotFired),
    HitConfirmed(HitConfirmed),
    PlayerDied(PlayerDied),
    PlayerRespawned(PlayerRespawned),
    ReloadConfirmed(ReloadConfirmed),
    WeaponChanged(WeaponChanged),
    InitialState(InitialState),
    WaveState(WaveState),
    UpgradeOffer(UpgradeOffer),
    UpgradeApplied(UpgradeApplied),

    PlayerMove(PlayerMove),
    MapSync(MapSync),
    Chat(ChatMessage),
}

impl GameEvent {
    pub fn code(&self) -> EventCode {
        match self {
            GameEvent::Fire(_) => EventCode::Fire,
            GameEvent::Hit(_) => EventCode::Hit,
            GameEvent::Reload(_) => EventCode::Reload,
            GameEvent::SyncWeapon(_) => EventCode::SyncWeapon,
            GameEvent::RequestRespawn(_) => EventCode::RequestRespawn,
            GameEvent::RequestInitialState(_) => EventCode::RequestInitialState,
            GameEvent::SelectUpgrade(_) => EventCode::SelectUpgrade,
            GameEvent::FireConfirmed(_) => EventCode::FireConfirmed,
            GameEvent::HitConfirmed(_) => EventCode::HitConfirmed,
            GameEvent::PlayerDied(_) => EventCode::PlayerDied,
            GameEvent::PlayerRespawned(_) => EventCode::PlayerRespawned,
            GameEvent::ReloadConfirmed(_) => EventCode::ReloadConfirmed,
            GameEvent::WeaponChanged(_) => EventCode::WeaponChanged,
            GameEvent::InitialState(_) => EventCode::InitialState,
            GameEvent::WaveState(_) => EventCode::WaveState,
            GameEvent::UpgradeOffer(_) => EventCode::UpgradeOffer,
            GameEvent::UpgradeApplied(_) => EventCode::UpgradeApplied,
            GameEvent::PlayerMove(_) => EventCode::PlayerMove,
            GameEvent::MapSync(_) => EventCode::MapSync,
            GameEvent::Chat(_) => EventCode::Chat,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.code().kind()
    }

    /// Encodes only the payload body; the code travels separately.
    pub fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, ProtocolError> {
        match self {
            GameEvent::Fire(p) => codec.encode(p),
            GameEvent::Hit(p) => codec.encode(p),
            GameEvent::Reload(p) => codec.encode(p),
            GameEvent::SyncWeapon(p) => codec.encode(p),
            GameEvent::RequestRespawn(p) => codec.encode(p),
            GameEvent::RequestInitialState(p) => codec.encode(p),
            GameEvent::SelectUpgrade(p) => codec.encode(p),
            GameEvent::FireConfirmed(p) => codec.encode(p),
            GameEvent::HitConfirmed(p) => codec.encode(p),
            GameEvent::PlayerDied(p) => codec.encode(p),
            GameEvent::PlayerRespawned(p) => codec.encode(p),
            GameEvent::ReloadConfirmed(p) => codec.encode(p),
            GameEvent::WeaponChanged(p) => codec.encode(p),
            GameEvent::InitialState(p) => codec.encode(p),
            GameEvent::WaveState(p) => codec.encode(p),
            GameEvent::UpgradeOffer(p) => codec.encode(p),
            GameEvent::UpgradeApplied(p) => codec.encode(p),
            GameEvent::PlayerMove(p) => codec.encode(p),
            GameEvent::MapSync(p) => codec.encode(p),
            GameEvent::Chat(p) => codec.encode(p),
        }
    }

    /// Decodes a payload body according to its wire code.
    ///
    /// # Errors
    /// `UnknownCode` if the code is not in the table, `Decode` if the bytes
    /// do not match that code's payload shape.
    pub fn decode<C: Codec>(
        code: u8,
        data: &[u8],
        codec: &C,
    ) -> Result<Self, ProtocolError> {
        let event = match EventCode::try_from(code)? {
            EventCode::Fire => GameEvent::Fire(codec.decode(data)?),
            EventCode::Hit => GameEvent::Hit(codec.decode(data)?),
            EventCode::Reload => GameEvent::Reload(codec.decode(data)?),
            EventCode::SyncWeapon => GameEvent::SyncWeapon(codec.decode(data)?),
            EventCode::RequestRespawn => {
                GameEvent::RequestRespawn(codec.decode(data)?)
            }
            EventCode::RequestInitialState => {
                GameEvent::RequestInitialState(codec.decode(data)?)
            }
            EventCode::SelectUpgrade => {
                GameEvent::SelectUpgrade(codec.decode(data)?)
            }
            EventCode::FireConfirmed => {
                GameEvent::FireConfirmed(codec.decode(data)?)
            }
            EventCode::HitConfirmed => GameEvent::HitConfirmed(codec.decode(data)?),
            EventCode::PlayerDied => GameEvent::PlayerDied(codec.decode(data)?),
            EventCode::PlayerRespawned => {
                GameEvent::PlayerRespawned(codec.decode(data)?)
            }
            EventCode::ReloadConfirmed => {
                GameEvent::ReloadConfirmed(codec.decode(data)?)
            }
            EventCode::WeaponChanged => {
                GameEvent::WeaponChanged(codec.decode(data)?)
            }
            EventCode::InitialState => GameEvent::InitialState(codec.decode(data)?),
            EventCode::WaveState => GameEvent::WaveState(codec.decode(data)?),
            EventCode::UpgradeOffer => GameEvent::UpgradeOffer(codec.decode(data)?),
            EventCode::UpgradeApplied => {
                GameEvent::UpgradeApplied(codec.decode(data)?)
            }
            EventCode::PlayerMove => GameEvent::PlayerMove(codec.decode(data)?),
            EventCode::MapSync => GameEvent::MapSync(codec.decode(data)?),
            EventCode::Chat => GameEvent::Chat(codec.decode(data)?),
        };
        Ok(event)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::JsonCodec;

    #[test]
    fn test_decode_fire_request_from_camel_case_json() {
        let data = br#"{"weaponId":"Rifle","origin":{"x":1,"y":2,"z":3},"direction":{"x":0,"y":0,"z":1}}"#;
        let ev = GameEvent::decode(1, data, &JsonCodec).unwrap();
        match ev {
            GameEvent::Fire(req) => {
                assert_eq!(req.weapon_id, "Rifle");
                assert_eq!(req.origin, Vec3::new(1.0, 2.0, 3.0));
            }
            other => panic!("expected Fire, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_code_returns_unknown_code() {
        let err = GameEvent::decode(99, b"{}", &JsonCodec).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCode(99)));
    }

    #[test]
    fn test_decode_payload_of_other_code_returns_decode_error() {
        // A chat body under the HitConfirmed code.
        let err = GameEvent::decode(21, br#"{"text":"hi"}"#, &JsonCodec).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_empty_request_bodies_encode_as_empty_object() {
        let bytes = GameEvent::RequestRespawn(RespawnRequest {})
            .encode(&JsonCodec)
            .unwrap();
        assert_eq!(bytes, b"{}");
        let ev = GameEvent::decode(6, b"{}", &JsonCodec).unwrap();
        assert_eq!(ev, GameEvent::RequestInitialState(InitialStateRequest {}));
    }

    #[test]
    fn test_player_died_without_killer_decodes() {
        let ev = GameEvent::decode(22, br#"{"victim":"bob"}"#, &JsonCodec).unwrap();
        assert_eq!(
            ev,
            GameEvent::PlayerDied(PlayerDied { victim: PeerId::new("bob"), killer: None })
        );
    }

    #[test]
    fn test_variant_code_matches_kind() {
        let ev = GameEvent::Chat(ChatMessage { text: "gg".into() });
        assert_eq!(ev.code(), EventCode::Chat);
        assert_eq!(ev.kind(), EventKind::System);

        let ev = GameEvent::WaveState(WaveState {
            wave: 2,
            phase: WavePhase::Active,
            enemies_remaining: 5,
        });
        assert_eq!(ev.kind(), EventKind::Authority);
        let json: serde_json::Value =
            serde_json::from_slice(&ev.encode(&JsonCodec).unwrap()).unwrap();
        assert_eq!(json["phase"], "active");
        assert_eq!(json["enemiesRemaining"], 5);
    }

    #[test]
    fn test_initial_state_snapshot_survives_encoding() {
        let mut alice = PlayerState::new(PeerId::new("alice"), "Alice");
        alice.set_health(40.0);
        let snapshot = GameEvent::InitialState(InitialState {
            players: vec![alice],
            wave: 3,
            map_id: Some("training_ground".into()),
            mode: None,
        });
        let bytes = snapshot.encode(&JsonCodec).unwrap();
        let back = GameEvent::decode(EventCode::InitialState.as_u8(), &bytes, &JsonCodec)
            .unwrap();
        assert_eq!(back, snapshot);
    }
}
