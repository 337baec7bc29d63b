//! The network event router.
//!
//! Every inbound event, from the relay or from the host's local loopback,
//! goes through [`NetworkEventRouter::handle_transport_event`]:
//!
//! ```text
//! event ──→ on_raw_event observers
//!       ──→ master && request-kind?  ──→ stop (the simulation decides)
//!       ──→ handler table[code]       ──→ roster side effects
//!                                     ──→ typed channel observers
//! ```
//!
//! The master stops at the raw channel for requests because an inbound
//! request is a claim, not a fact: it reaches game code only after the
//! authoritative simulation answers it with an authority event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hostlink_protocol::{
    ChatMessage, Codec, EventCode, EventKind, HitConfirmed, InboundEvent,
    InitialState, JsonCodec, MapSync, PeerId, PlayerDied, PlayerMove,
    PlayerRespawned, PlayerState, ReloadConfirmed, Sender, ShotFired,
    UpgradeApplied, UpgradeOffer, Vec3, WaveState, WeaponChanged,
};
use hostlink_transport::Actor;
use serde::de::DeserializeOwned;

use crate::{Observable, PlayerStateManager};

/// A per-code handler in the router's dispatch table.
pub type EventHandler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Distance beyond which a relayed copy of our own move counts as drift.
pub const DEFAULT_MOVE_TOLERANCE: f32 = 0.5;

/// Which observers [`NetworkEventRouter::clear_observers`] removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverScope {
    /// Typed channels only. Raw observers and the handler table stay, so
    /// the router keeps working for the next room.
    Session,
    /// Everything, including raw observers and the handler table.
    All,
}

/// A payload together with who sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct Received<T> {
    pub sender: Sender,
    pub payload: T,
}

// ---------------------------------------------------------------------------
// Typed channels
// ---------------------------------------------------------------------------

/// Typed observer channels fed by the default handlers.
#[derive(Default)]
pub struct RouterChannels {
    // -- armed --
    pub on_fire: Observable<ShotFired>,
    pub on_reload: Observable<ReloadConfirmed>,
    pub on_weapon_changed: Observable<WeaponChanged>,

    // -- combat --
    pub on_hit: Observable<HitConfirmed>,
    pub on_death: Observable<PlayerDied>,
    pub on_respawn: Observable<PlayerRespawned>,

    // -- progression --
    pub on_wave_state: Observable<WaveState>,
    pub on_upgrade_offer: Observable<UpgradeOffer>,
    pub on_upgrade_applied: Observable<UpgradeApplied>,

    // -- snapshot --
    pub on_initial_state: Observable<InitialState>,

    // -- system --
    pub on_player_moved: Observable<Received<PlayerMove>>,
    pub on_map_sync: Observable<Received<MapSync>>,
    pub on_chat: Observable<Received<ChatMessage>>,
}

impl RouterChannels {
    pub fn clear(&self) {
        self.on_fire.clear();
        self.on_reload.clear();
        self.on_weapon_changed.clear();
        self.on_hit.clear();
        self.on_death.clear();
        self.on_respawn.clear();
        self.on_wave_state.clear();
        self.on_upgrade_offer.clear();
        self.on_upgrade_applied.clear();
        self.on_initial_state.clear();
        self.on_player_moved.clear();
        self.on_map_sync.clear();
        self.on_chat.clear();
    }
}

// ---------------------------------------------------------------------------
// Local peer tracking
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LocalPeer {
    id: Option<PeerId>,
    last_sent_position: Option<Vec3>,
}

type SharedLocal = Arc<Mutex<LocalPeer>>;

fn lock_local(local: &SharedLocal) -> MutexGuard<'_, LocalPeer> {
    local.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// NetworkEventRouter
// ---------------------------------------------------------------------------

/// Routes inbound events to observers and keeps the roster current.
pub struct NetworkEventRouter<C: Codec = JsonCodec> {
    codec: C,
    roster: Arc<PlayerStateManager>,
    channels: Arc<RouterChannels>,
    on_raw_event: Observable<InboundEvent>,
    handlers: Mutex<HashMap<u8, EventHandler>>,
    local: SharedLocal,
    move_tolerance: f32,
}

impl NetworkEventRouter<JsonCodec> {
    pub fn new(roster: Arc<PlayerStateManager>) -> Self {
        Self::with_codec(JsonCodec, roster)
    }
}

impl<C: Codec> NetworkEventRouter<C> {
    /// A router with the default handlers installed.
    pub fn with_codec(codec: C, roster: Arc<PlayerStateManager>) -> Self {
        let router = Self {
            codec,
            roster,
            channels: Arc::new(RouterChannels::default()),
            on_raw_event: Observable::new(),
            handlers: Mutex::new(HashMap::new()),
            local: SharedLocal::default(),
            move_tolerance: DEFAULT_MOVE_TOLERANCE,
        };
        router.install_default_handlers();
        router
    }

    pub fn with_move_tolerance(mut self, tolerance: f32) -> Self {
        self.move_tolerance = tolerance;
        self.install_default_handlers();
        self
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn roster(&self) -> &Arc<PlayerStateManager> {
        &self.roster
    }

    pub fn channels(&self) -> &RouterChannels {
        &self.channels
    }

    /// Sees every inbound event before any filtering.
    pub fn on_raw_event(&self) -> &Observable<InboundEvent> {
        &self.on_raw_event
    }

    /// Sets the local peer id used to recognise echoes of our own moves.
    pub fn set_local_peer(&self, id: Option<PeerId>) {
        lock_local(&self.local).id = id;
    }

    pub fn local_peer(&self) -> Option<PeerId> {
        lock_local(&self.local).id.clone()
    }

    /// Records the position we just published, for drift checks.
    pub fn record_local_move(&self, position: Vec3) {
        lock_local(&self.local).last_sent_position = Some(position);
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Routes one inbound event. `is_master_now` must be queried from the
    /// relay at call time.
    pub fn handle_transport_event(&self, event: &InboundEvent, is_master_now: bool) {
        self.on_raw_event.notify(event);

        let kind = event.kind();
        if is_master_now && kind == Some(EventKind::Request) {
            tracing::trace!(
                code = event.code,
                sender = %event.sender,
                "request held for the authoritative simulation"
            );
            return;
        }

        let handler = self.lock_handlers().get(&event.code).cloned();
        match handler {
            Some(handler) => handler(event),
            None => tracing::debug!(
                code = event.code,
                sender = %event.sender,
                "no handler for event code"
            ),
        }
    }

    /// Adds a peer that entered the room. An entry that already exists
    /// (from a snapshot) is left untouched.
    pub fn handle_player_joined(&self, actor: &Actor) {
        if self.roster.contains(&actor.id) {
            return;
        }
        self.roster
            .upsert(PlayerState::new(actor.id.clone(), actor.name.clone()));
    }

    pub fn handle_player_left(&self, id: &PeerId) {
        self.roster.remove(id);
    }

    // -----------------------------------------------------------------------
    // Handler table
    // -----------------------------------------------------------------------

    /// Registers a handler for `code`, returning the one it replaces.
    pub fn register_handler(
        &self,
        code: u8,
        handler: impl Fn(&InboundEvent) + Send + Sync + 'static,
    ) -> Option<EventHandler> {
        self.lock_handlers().insert(code, Arc::new(handler))
    }

    pub fn unregister_handler(&self, code: u8) -> Option<EventHandler> {
        self.lock_handlers().remove(&code)
    }

    pub fn has_handler(&self, code: u8) -> bool {
        self.lock_handlers().contains_key(&code)
    }

    /// Removes observers in `scope`.
    pub fn clear_observers(&self, scope: ObserverScope) {
        self.channels.clear();
        if scope == ObserverScope::All {
            self.on_raw_event.clear();
            self.roster.clear_observers();
            self.lock_handlers().clear();
        }
        tracing::debug!(?scope, "router observers cleared");
    }

    /// (Re)installs the handlers for every authority and system code.
    /// Custom handlers for other codes are kept.
    pub fn install_default_handlers(&self) {
        let roster = &self.roster;
        let channels = &self.channels;
        let mut table = self.lock_handlers();

        // -- armed --
        table.insert(
            EventCode::FireConfirmed.as_u8(),
            notify_only(&self.codec, channels, |c| &c.on_fire),
        );
        table.insert(
            EventCode::ReloadConfirmed.as_u8(),
            notify_only(&self.codec, channels, |c| &c.on_reload),
        );
        table.insert(EventCode::WeaponChanged.as_u8(), {
            let (roster, channels) = (Arc::clone(roster), Arc::clone(channels));
            typed(&self.codec, move |changed: WeaponChanged, _| {
                roster.update(&changed.player, |p| p.weapon_id = changed.weapon_id.clone());
                channels.on_weapon_changed.notify(&changed);
            })
        });

        // -- combat --
        table.insert(EventCode::HitConfirmed.as_u8(), {
            let (roster, channels) = (Arc::clone(roster), Arc::clone(channels));
            typed(&self.codec, move |hit: HitConfirmed, _| {
                roster.update(&hit.target, |p| p.set_health(hit.health));
                channels.on_hit.notify(&hit);
            })
        });
        table.insert(EventCode::PlayerDied.as_u8(), {
            let (roster, channels) = (Arc::clone(roster), Arc::clone(channels));
            typed(&self.codec, move |died: PlayerDied, _| {
                roster.update(&died.victim, |p| {
                    p.set_health(0.0);
                    p.is_dead = true;
                });
                channels.on_death.notify(&died);
            })
        });
        table.insert(EventCode::PlayerRespawned.as_u8(), {
            let (roster, channels) = (Arc::clone(roster), Arc::clone(channels));
            typed(&self.codec, move |respawned: PlayerRespawned, _| {
                roster.update(&respawned.player, |p| {
                    p.set_health(respawned.health);
                    p.position = respawned.position;
                    p.is_dead = false;
                });
                channels.on_respawn.notify(&respawned);
            })
        });

        // -- progression --
        table.insert(
            EventCode::WaveState.as_u8(),
            notify_only(&self.codec, channels, |c| &c.on_wave_state),
        );
        table.insert(
            EventCode::UpgradeOffer.as_u8(),
            notify_only(&self.codec, channels, |c| &c.on_upgrade_offer),
        );
        table.insert(
            EventCode::UpgradeApplied.as_u8(),
            notify_only(&self.codec, channels, |c| &c.on_upgrade_applied),
        );

        // -- snapshot --
        table.insert(EventCode::InitialState.as_u8(), {
            let (roster, channels) = (Arc::clone(roster), Arc::clone(channels));
            typed(&self.codec, move |snapshot: InitialState, _| {
                roster.apply_snapshot(&snapshot.players);
                tracing::debug!(
                    players = snapshot.players.len(),
                    wave = snapshot.wave,
                    "initial state applied"
                );
                channels.on_initial_state.notify(&snapshot);
            })
        });

        // -- system --
        table.insert(EventCode::PlayerMove.as_u8(), {
            let (roster, channels) = (Arc::clone(roster), Arc::clone(channels));
            let local = Arc::clone(&self.local);
            let tolerance = self.move_tolerance;
            typed(&self.codec, move |moved: PlayerMove, event| {
                if let Some(peer) = event.sender.peer() {
                    let own = {
                        let local = lock_local(&local);
                        (local.id.as_ref() == Some(peer))
                            .then_some(local.last_sent_position)
                    };
                    match own {
                        Some(last_sent) => {
                            reconcile_local_move(last_sent, &moved, tolerance);
                            return;
                        }
                        None => {
                            roster.update(peer, |p| {
                                p.position = moved.position;
                                p.rotation = moved.rotation;
                            });
                        }
                    }
                }
                channels.on_player_moved.notify(&Received {
                    sender: event.sender.clone(),
                    payload: moved,
                });
            })
        });
        table.insert(EventCode::MapSync.as_u8(), {
            let channels = Arc::clone(channels);
            typed(&self.codec, move |sync: MapSync, event| {
                channels.on_map_sync.notify(&Received {
                    sender: event.sender.clone(),
                    payload: sync,
                });
            })
        });
        table.insert(EventCode::Chat.as_u8(), {
            let channels = Arc::clone(channels);
            typed(&self.codec, move |chat: ChatMessage, event| {
                channels.on_chat.notify(&Received {
                    sender: event.sender.clone(),
                    payload: chat,
                });
            })
        });
    }

    fn lock_handlers(&self) -> MutexGuard<'_, HashMap<u8, EventHandler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Handler builders
// ---------------------------------------------------------------------------

/// Wraps `f` in a handler that decodes the payload first and drops the
/// event with a warning when it does not decode.
fn typed<T, C, F>(codec: &C, f: F) -> EventHandler
where
    T: DeserializeOwned + 'static,
    C: Codec,
    F: Fn(T, &InboundEvent) + Send + Sync + 'static,
{
    let codec = codec.clone();
    Arc::new(move |event: &InboundEvent| match event.payload::<T, C>(&codec) {
        Ok(payload) => f(payload, event),
        Err(error) => tracing::warn!(
            code = event.code,
            sender = %event.sender,
            %error,
            "dropping undecodable event"
        ),
    })
}

/// A handler with no roster side effect: decode, then notify one channel.
fn notify_only<T, C>(
    codec: &C,
    channels: &Arc<RouterChannels>,
    channel: fn(&RouterChannels) -> &Observable<T>,
) -> EventHandler
where
    T: DeserializeOwned + 'static,
    C: Codec,
{
    let channels = Arc::clone(channels);
    typed(codec, move |payload: T, _| channel(&channels).notify(&payload))
}

fn reconcile_local_move(last_sent: Option<Vec3>, moved: &PlayerMove, tolerance: f32) {
    let Some(last_sent) = last_sent else {
        return;
    };
    let drift = last_sent.distance(&moved.position);
    if drift > tolerance {
        tracing::warn!(drift, tolerance, "relayed local position diverged from last sent");
    } else {
        tracing::trace!(drift, "local move echo within tolerance");
    }
}
