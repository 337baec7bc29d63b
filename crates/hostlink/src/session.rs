//! Host, join, leave and takeover orchestration.
//!
//! ```text
//!   Idle ──host_game──▶ Hosting ──simulation up──▶ InSession
//!     ▲                                               │
//!     └──────────────────leave_game───────────────────┘
//! ```
//!
//! Takeover is entered from two places that legitimately race: a join
//! that finds this peer already master, and a `MasterClientSwitched`
//! notification naming this peer. Both end in [`NetworkSession::handle_takeover`],
//! which does nothing while a simulation is running.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hostlink_authority::{AuthorityDispatcher, LocalServerManager, SimulationParams};
use hostlink_protocol::{Codec, GameEvent, InitialStateRequest, JsonCodec, PeerId};
use hostlink_room::RoomManager;
use hostlink_router::{NetworkEventRouter, ObserverScope};
use hostlink_transport::TransportProvider;

use crate::HostlinkError;

/// Where the local peer stands in the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Room created, simulation not yet running.
    Hosting,
    InSession,
}

#[derive(Debug, Default)]
struct SessionState {
    phase: SessionPhase,
    room: Option<String>,
    mode: Option<String>,
    takeover_pending: bool,
}

/// Ties a room to the local simulation for the lifetime of one game.
pub struct NetworkSession<P, C: Codec = JsonCodec> {
    rooms: Arc<RoomManager<P>>,
    dispatcher: Arc<AuthorityDispatcher<P, C>>,
    router: Arc<NetworkEventRouter<C>>,
    server: Arc<LocalServerManager>,
    state: Mutex<SessionState>,
}

impl<P: TransportProvider, C: Codec> NetworkSession<P, C> {
    pub fn new(
        rooms: Arc<RoomManager<P>>,
        dispatcher: Arc<AuthorityDispatcher<P, C>>,
        router: Arc<NetworkEventRouter<C>>,
        server: Arc<LocalServerManager>,
    ) -> Self {
        Self {
            rooms,
            dispatcher,
            router,
            server,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    /// Room of the active session, if any.
    pub fn room(&self) -> Option<String> {
        self.lock().room.clone()
    }

    /// Whether this peer was promoted to master and has not yet finished
    /// taking over.
    pub fn is_takeover_pending(&self) -> bool {
        self.lock().takeover_pending
    }

    pub fn is_hosting_simulation(&self) -> bool {
        self.server.is_running()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Creates `room` and starts the local simulation for it.
    ///
    /// Returns `Ok(false)` if the room could not be created; nothing else
    /// is attempted in that case.
    ///
    /// # Errors
    /// Simulation startup failures. The session stays in `Hosting` so the
    /// caller can retry through [`handle_takeover`](Self::handle_takeover)
    /// or leave.
    pub async fn host_game(
        &self,
        room: &str,
        map_id: &str,
        mode: Option<&str>,
    ) -> Result<bool, HostlinkError> {
        if !self.rooms.create_room(room, map_id).await {
            return Ok(false);
        }
        {
            let mut state = self.lock();
            state.phase = SessionPhase::Hosting;
            state.room = Some(room.to_string());
            state.mode = mode.map(String::from);
            state.takeover_pending = false;
        }
        self.seed_roster();

        let params = SimulationParams {
            room: room.to_string(),
            map_id: Some(map_id.to_string()),
            mode: mode.map(String::from),
            takeover: false,
            roster: Vec::new(),
        };
        self.server.start(params)?;
        self.lock().phase = SessionPhase::InSession;
        tracing::info!(room, map_id, "hosting game");
        Ok(true)
    }

    /// Joins `room` and asks the current master for a snapshot. Takes
    /// over on the spot if the relay already made this peer master.
    ///
    /// # Errors
    /// Simulation startup failures during an immediate takeover.
    pub async fn join_game(&self, room: &str) -> Result<bool, HostlinkError> {
        if !self.rooms.join_room(room).await {
            return Ok(false);
        }
        let promoted_early = {
            let mut state = self.lock();
            state.phase = SessionPhase::InSession;
            state.room = Some(room.to_string());
            state.takeover_pending
        };
        self.seed_roster();
        tracing::info!(room, "joined game");

        let request = GameEvent::RequestInitialState(InitialStateRequest {});
        if let Err(error) = self.dispatcher.request(&request) {
            tracing::warn!(room, %error, "initial state request failed");
        }

        if self.dispatcher.is_master() || promoted_early {
            self.lock().takeover_pending = true;
            self.handle_takeover(room)?;
        }
        Ok(true)
    }

    /// Stops the simulation, then leaves the room, then drops everything
    /// scoped to this game.
    pub fn leave_game(&self) {
        self.server.stop();
        self.rooms.leave_room();
        self.router.clear_observers(ObserverScope::Session);
        self.router.roster().clear();

        let room = {
            let mut state = self.lock();
            let room = state.room.take();
            *state = SessionState::default();
            room
        };
        tracing::info!(room = ?room, "left game");
    }

    // -----------------------------------------------------------------------
    // Host migration
    // -----------------------------------------------------------------------

    /// Starts the simulation for an existing room, seeded from the local
    /// roster. Returns `Ok(false)` if one is already running.
    ///
    /// # Errors
    /// Simulation startup failures. Calling again retries.
    pub fn handle_takeover(&self, room: &str) -> Result<bool, HostlinkError> {
        if self.server.is_running() {
            self.lock().takeover_pending = false;
            tracing::debug!(room, "takeover skipped, simulation already running");
            return Ok(false);
        }

        let mode = self.lock().mode.clone();
        let params = SimulationParams {
            room: room.to_string(),
            map_id: self.rooms.map_id(),
            mode,
            takeover: true,
            roster: self.router.roster().snapshot(),
        };
        let started = self.server.start(params)?;

        let mut state = self.lock();
        state.takeover_pending = false;
        state.phase = SessionPhase::InSession;
        drop(state);
        if started {
            tracing::info!(room, "took over as host");
        }
        Ok(started)
    }

    /// Reacts to the relay electing `new_master`.
    ///
    /// # Errors
    /// Simulation startup failures during takeover.
    pub fn handle_master_switch(&self, new_master: &PeerId) -> Result<bool, HostlinkError> {
        let local = self.dispatcher.provider().local_player_id();
        if local.as_ref() != Some(new_master) {
            tracing::debug!(%new_master, "master switched to another peer");
            return Ok(false);
        }

        let room = {
            let mut state = self.lock();
            state.takeover_pending = true;
            match (state.phase, state.room.clone()) {
                (SessionPhase::Idle, _) | (_, None) => None,
                (_, Some(room)) => Some(room),
            }
        };
        match room {
            Some(room) => {
                tracing::info!(%room, "promoted to master");
                self.handle_takeover(&room)
            }
            None => {
                // A join still in flight picks this up when it completes.
                tracing::debug!("promoted to master outside a session, takeover deferred");
                Ok(false)
            }
        }
    }

    /// The relay connection went away; the room went with it.
    pub fn handle_connection_lost(&self) {
        if self.phase() == SessionPhase::Idle {
            return;
        }
        self.server.stop();
        let room = {
            let mut state = self.lock();
            let room = state.room.take();
            *state = SessionState::default();
            room
        };
        tracing::warn!(room = ?room, "connection lost, session ended");
    }

    /// Puts every actor of the current room into the roster.
    fn seed_roster(&self) {
        for actor in self.dispatcher.provider().actors().values() {
            self.router.handle_player_joined(actor);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
