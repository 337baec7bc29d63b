//! `NetworkClient` builder and notification pump.
//!
//! This is the entry point for an application. It owns one instance of
//! every component and wires the relay's notifications to them:
//! transport → connection/room/roster → router → application observers.

use std::sync::{Arc, Weak};

use hostlink_authority::{
    AuthoritativeSimulation, AuthorityDispatcher, LocalServerManager, LogicalServer,
    LogicalServerConfig, SimulationError, SimulationFactory, SimulationParams,
};
use hostlink_connection::{ConnectionManager, ReconnectPolicy};
use hostlink_protocol::{
    ChatMessage, Codec, EventKind, FireRequest, GameEvent, HitRequest, InboundEvent,
    JsonCodec, MapSync, PeerId, PlayerMove, ReloadRequest, RespawnRequest, Sender,
    UpgradeSelection, Vec3, WeaponSync,
};
use hostlink_room::{RoomConfig, RoomManager};
use hostlink_router::{
    DEFAULT_MOVE_TOLERANCE, NetworkEventRouter, ObserverScope, PlayerStateManager,
};
use hostlink_transport::{TransportNotification, TransportProvider};
use tokio::sync::{Mutex, broadcast};

use crate::{HostlinkError, NetworkSession};

/// Builds the simulation a host runs, given the client's dispatcher.
pub type SimulationBuilder<P, C> = Arc<
    dyn Fn(
            Arc<AuthorityDispatcher<P, C>>,
            SimulationParams,
        ) -> Result<Box<dyn AuthoritativeSimulation>, SimulationError>
        + Send
        + Sync,
>;

/// Builder for [`NetworkClient`].
///
/// # Example
///
/// ```rust,ignore
/// let relay = MemoryRelay::start();
/// let client = NetworkClient::builder(relay.provider())
///     .room_config(RoomConfig { max_players: 4, ..RoomConfig::default() })
///     .build();
/// ```
pub struct NetworkClientBuilder<P, C: Codec = JsonCodec> {
    provider: Arc<P>,
    codec: C,
    policy: ReconnectPolicy,
    room_config: RoomConfig,
    server_config: LogicalServerConfig,
    simulation: Option<SimulationBuilder<P, C>>,
    move_tolerance: f32,
}

impl<P: TransportProvider> NetworkClientBuilder<P, JsonCodec> {
    /// Builder around a provider that is already shared.
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            codec: JsonCodec,
            policy: ReconnectPolicy::default(),
            room_config: RoomConfig::default(),
            server_config: LogicalServerConfig::default(),
            simulation: None,
            move_tolerance: DEFAULT_MOVE_TOLERANCE,
        }
    }
}

impl<P: TransportProvider, C: Codec> NetworkClientBuilder<P, C> {
    /// Swaps the payload codec. Resets any custom simulation, which is
    /// typed by codec.
    pub fn codec<C2: Codec>(self, codec: C2) -> NetworkClientBuilder<P, C2> {
        NetworkClientBuilder {
            provider: self.provider,
            codec,
            policy: self.policy,
            room_config: self.room_config,
            server_config: self.server_config,
            simulation: None,
            move_tolerance: self.move_tolerance,
        }
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Rules for the bundled [`LogicalServer`]. Ignored when a custom
    /// simulation is set.
    pub fn server_config(mut self, config: LogicalServerConfig) -> Self {
        self.server_config = config;
        self
    }

    /// Replaces the bundled [`LogicalServer`] with another simulation.
    pub fn simulation(
        mut self,
        build: impl Fn(
            Arc<AuthorityDispatcher<P, C>>,
            SimulationParams,
        ) -> Result<Box<dyn AuthoritativeSimulation>, SimulationError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.simulation = Some(Arc::new(build));
        self
    }

    /// How far a move echoed back for the local peer may drift from the
    /// last position it sent before it is logged.
    pub fn move_tolerance(mut self, tolerance: f32) -> Self {
        self.move_tolerance = tolerance;
        self
    }

    /// Wires every component together. Notifications start queueing
    /// immediately; drive them with [`NetworkClient::run`] or
    /// [`NetworkClient::process_pending`].
    pub fn build(self) -> Arc<NetworkClient<P, C>> {
        let provider = self.provider;
        let notifications = provider.subscribe();

        let connection = ConnectionManager::new(Arc::clone(&provider), self.policy);
        let rooms = Arc::new(RoomManager::new(Arc::clone(&connection), self.room_config));
        let roster = Arc::new(PlayerStateManager::new());
        let router = Arc::new(
            NetworkEventRouter::with_codec(self.codec.clone(), Arc::clone(&roster))
                .with_move_tolerance(self.move_tolerance),
        );
        let dispatcher = Arc::new(AuthorityDispatcher::with_codec(
            Arc::clone(&provider),
            self.codec,
        ));

        let factory: SimulationFactory = match self.simulation {
            Some(build) => {
                let dispatcher = Arc::clone(&dispatcher);
                Arc::new(move |params: SimulationParams| build(Arc::clone(&dispatcher), params))
            }
            None => LogicalServer::factory(Arc::clone(&dispatcher), self.server_config),
        };
        let server = Arc::new(LocalServerManager::new(factory));

        // Loopback re-enters the router with the live master flag. Weak,
        // since the router's observers reach back to the dispatcher.
        let weak_router: Weak<NetworkEventRouter<C>> = Arc::downgrade(&router);
        let loop_provider = Arc::clone(&provider);
        dispatcher.set_local_dispatch(move |event: InboundEvent| {
            if let Some(router) = weak_router.upgrade() {
                router.handle_transport_event(&event, loop_provider.is_master_client());
            }
        });

        let session = Arc::new(NetworkSession::new(
            Arc::clone(&rooms),
            Arc::clone(&dispatcher),
            Arc::clone(&router),
            Arc::clone(&server),
        ));

        let client = Arc::new(NetworkClient {
            provider,
            connection,
            rooms,
            roster,
            router,
            dispatcher,
            server,
            session,
            notifications: Mutex::new(notifications),
        });
        client.install_request_forwarding();
        client
    }
}

/// One peer's view of the network: connection, room, roster, routing,
/// dispatch and, while master, the authoritative simulation.
pub struct NetworkClient<P, C: Codec = JsonCodec> {
    provider: Arc<P>,
    connection: Arc<ConnectionManager<P>>,
    rooms: Arc<RoomManager<P>>,
    roster: Arc<PlayerStateManager>,
    router: Arc<NetworkEventRouter<C>>,
    dispatcher: Arc<AuthorityDispatcher<P, C>>,
    server: Arc<LocalServerManager>,
    session: Arc<NetworkSession<P, C>>,
    notifications: Mutex<broadcast::Receiver<TransportNotification>>,
}

impl<P: TransportProvider> NetworkClient<P, JsonCodec> {
    pub fn builder(provider: P) -> NetworkClientBuilder<P, JsonCodec> {
        NetworkClientBuilder::new(Arc::new(provider))
    }
}

impl<P: TransportProvider, C: Codec> NetworkClient<P, C> {
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn connection(&self) -> &Arc<ConnectionManager<P>> {
        &self.connection
    }

    pub fn rooms(&self) -> &Arc<RoomManager<P>> {
        &self.rooms
    }

    pub fn roster(&self) -> &Arc<PlayerStateManager> {
        &self.roster
    }

    pub fn router(&self) -> &Arc<NetworkEventRouter<C>> {
        &self.router
    }

    pub fn dispatcher(&self) -> &Arc<AuthorityDispatcher<P, C>> {
        &self.dispatcher
    }

    pub fn server(&self) -> &Arc<LocalServerManager> {
        &self.server
    }

    pub fn session(&self) -> &Arc<NetworkSession<P, C>> {
        &self.session
    }

    pub fn local_peer(&self) -> Option<PeerId> {
        self.provider.local_player_id()
    }

    pub fn is_master(&self) -> bool {
        self.provider.is_master_client()
    }

    // -----------------------------------------------------------------------
    // Connection and session
    // -----------------------------------------------------------------------

    pub async fn connect(&self, user_id: &str) -> bool {
        let connected = self.connection.connect(user_id).await;
        self.router.set_local_peer(self.provider.local_player_id());
        connected
    }

    pub fn disconnect(&self) {
        self.session.handle_connection_lost();
        self.connection.disconnect();
    }

    /// See [`NetworkSession::host_game`].
    pub async fn host_game(
        &self,
        room: &str,
        map_id: &str,
        mode: Option<&str>,
    ) -> Result<bool, HostlinkError> {
        self.session.host_game(room, map_id, mode).await
    }

    /// See [`NetworkSession::join_game`].
    pub async fn join_game(&self, room: &str) -> Result<bool, HostlinkError> {
        self.session.join_game(room).await
    }

    pub fn leave_game(&self) {
        self.session.leave_game();
    }

    /// Map of the current room, as published by its creator.
    pub fn map_id(&self) -> Option<String> {
        self.rooms.map_id()
    }

    /// Fully resets the router (typically at scene teardown) and re-arms
    /// the wiring this client depends on.
    pub fn reset_observers(&self) {
        self.router.clear_observers(ObserverScope::All);
        self.router.install_default_handlers();
        self.install_request_forwarding();
    }

    // -----------------------------------------------------------------------
    // Notification pump
    // -----------------------------------------------------------------------

    /// Handles every notification already queued, without waiting.
    /// Returns how many were handled; `0` while [`run`](Self::run) owns
    /// the queue.
    pub fn process_pending(&self) -> usize {
        let Ok(mut notifications) = self.notifications.try_lock() else {
            return 0;
        };
        let mut handled = 0;
        loop {
            match notifications.try_recv() {
                Ok(notification) => {
                    self.handle_notification(notification);
                    handled += 1;
                }
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "notification queue overflowed");
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return handled,
            }
        }
    }

    /// Handles notifications until the relay goes away.
    pub async fn run(&self) {
        let mut notifications = self.notifications.lock().await;
        tracing::debug!("notification pump running");
        loop {
            match notifications.recv().await {
                Ok(notification) => self.handle_notification(notification),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "notification queue overflowed");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("relay closed, notification pump stopped");
                    return;
                }
            }
        }
    }

    /// Routes one relay notification to the component that owns it.
    pub fn handle_notification(&self, notification: TransportNotification) {
        match notification {
            TransportNotification::StateChanged(state) => {
                self.connection.handle_state_change(state);
                self.router.set_local_peer(self.provider.local_player_id());
                if state.is_down() {
                    self.session.handle_connection_lost();
                }
            }
            TransportNotification::RoomListUpdated(rooms) => {
                self.rooms.handle_room_list(rooms);
            }
            TransportNotification::Event { code, data, sender } => {
                let event = InboundEvent::new(code, data, Sender::Peer(sender));
                self.router
                    .handle_transport_event(&event, self.provider.is_master_client());
            }
            TransportNotification::PlayerJoined(actor) => {
                self.router.handle_player_joined(&actor);
                self.server.player_joined(actor);
            }
            TransportNotification::PlayerLeft(id) => {
                self.router.handle_player_left(&id);
                self.server.player_left(id);
            }
            TransportNotification::MasterClientSwitched(id) => {
                if let Err(error) = self.session.handle_master_switch(&id) {
                    tracing::error!(%error, "takeover after master switch failed");
                }
            }
        }
    }

    /// Requests seen by the router while this peer is master go to the
    /// simulation. Covers both relayed requests and the host's own
    /// loopback.
    fn install_request_forwarding(&self) {
        let server = Arc::downgrade(&self.server);
        let provider = Arc::clone(&self.provider);
        self.router.on_raw_event().add(move |event: &InboundEvent| {
            if event.kind() != Some(EventKind::Request) || !provider.is_master_client() {
                return;
            }
            if let Some(server) = server.upgrade() {
                server.handle_request(event.clone());
            }
        });
    }

    // -----------------------------------------------------------------------
    // Gameplay
    // -----------------------------------------------------------------------

    pub fn fire(
        &self,
        weapon_id: &str,
        origin: Vec3,
        direction: Vec3,
    ) -> Result<(), HostlinkError> {
        self.request(GameEvent::Fire(FireRequest {
            weapon_id: weapon_id.to_string(),
            origin,
            direction,
        }))
    }

    pub fn hit(
        &self,
        target: &PeerId,
        weapon_id: &str,
        damage: f32,
        headshot: bool,
    ) -> Result<(), HostlinkError> {
        self.request(GameEvent::Hit(HitRequest {
            target: target.clone(),
            weapon_id: weapon_id.to_string(),
            damage,
            headshot,
        }))
    }

    pub fn reload(&self, weapon_id: &str) -> Result<(), HostlinkError> {
        self.request(GameEvent::Reload(ReloadRequest {
            weapon_id: weapon_id.to_string(),
        }))
    }

    pub fn switch_weapon(&self, weapon_id: &str) -> Result<(), HostlinkError> {
        self.request(GameEvent::SyncWeapon(WeaponSync {
            weapon_id: weapon_id.to_string(),
        }))
    }

    pub fn request_respawn(&self) -> Result<(), HostlinkError> {
        self.request(GameEvent::RequestRespawn(RespawnRequest {}))
    }

    pub fn select_upgrade(&self, upgrade_id: &str) -> Result<(), HostlinkError> {
        self.request(GameEvent::SelectUpgrade(UpgradeSelection {
            upgrade_id: upgrade_id.to_string(),
        }))
    }

    /// Publishes the local position unreliably and remembers it for
    /// reconciliation against echoes.
    pub fn send_move(&self, position: Vec3, rotation: Vec3) -> Result<(), HostlinkError> {
        self.router.record_local_move(position);
        self.send(GameEvent::PlayerMove(PlayerMove { position, rotation }))
    }

    pub fn send_chat(&self, text: &str) -> Result<(), HostlinkError> {
        self.send(GameEvent::Chat(ChatMessage {
            text: text.to_string(),
        }))
    }

    pub fn sync_map(&self, map_id: &str) -> Result<(), HostlinkError> {
        self.send(GameEvent::MapSync(MapSync {
            map_id: map_id.to_string(),
        }))
    }

    fn request(&self, event: GameEvent) -> Result<(), HostlinkError> {
        Ok(self.dispatcher.request(&event)?)
    }

    fn send(&self, event: GameEvent) -> Result<(), HostlinkError> {
        Ok(self.dispatcher.send(&event)?)
    }
}
