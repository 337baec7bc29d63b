//! In-process relay with Photon-style room semantics.
//!
//! The relay runs as a single Tokio task (the hub) that owns every room and
//! connected peer. [`MemoryProvider`] handles talk to it through an
//! unbounded command channel; operations that need an answer carry a
//! oneshot reply channel. The hub also keeps a per-peer [`PeerView`] up to
//! date so that the synchronous provider queries (`is_master_client`,
//! `actors`, `room_property`) never have to wait on the hub.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{
    Actor, CreateRoomOptions, PeerId, ReceiverGroup, RelayState, RoomInfo,
    SendOptions, TransportError, TransportNotification, TransportProvider,
};

/// Relay behaviour knobs.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Enter the lobby right after reaching the master server, and return to
    /// it after leaving a room.
    pub auto_join_lobby: bool,
    /// Per-peer notification buffer.
    pub notification_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            auto_join_lobby: true,
            notification_capacity: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared peer view
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PeerView {
    local_id: Option<PeerId>,
    room: Option<RoomView>,
}

#[derive(Debug, Clone)]
struct RoomView {
    name: String,
    actors: BTreeMap<PeerId, Actor>,
    master: Option<PeerId>,
    properties: HashMap<String, serde_json::Value>,
}

type SharedView = Arc<Mutex<PeerView>>;

fn lock(view: &SharedView) -> MutexGuard<'_, PeerView> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Hub commands
// ---------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<Result<T, TransportError>>;

enum HubCommand {
    Connect {
        user_id: String,
        view: SharedView,
        notify: broadcast::Sender<TransportNotification>,
        reply: Reply<()>,
    },
    Disconnect {
        peer: PeerId,
    },
    CreateRoom {
        peer: PeerId,
        name: String,
        options: CreateRoomOptions,
        reply: Reply<()>,
    },
    JoinRoom {
        peer: PeerId,
        name: String,
        reply: Reply<()>,
    },
    LeaveRoom {
        peer: PeerId,
    },
    Raise {
        peer: PeerId,
        code: u8,
        data: Vec<u8>,
        receivers: ReceiverGroup,
    },
    ListRooms {
        reply: oneshot::Sender<Vec<RoomInfo>>,
    },
    RefreshRoomList {
        peer: PeerId,
    },
    ReapRoom {
        name: String,
        generation: u64,
    },
}

// ---------------------------------------------------------------------------
// MemoryRelay
// ---------------------------------------------------------------------------

/// An in-process relay. Cheap to clone; every clone talks to the same hub.
///
/// Must be started inside a Tokio runtime.
#[derive(Clone)]
pub struct MemoryRelay {
    commands: mpsc::UnboundedSender<HubCommand>,
    reachable: Arc<AtomicBool>,
    epoch: Instant,
    config: RelayConfig,
}

impl MemoryRelay {
    /// Starts a relay with the default configuration.
    pub fn start() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Starts a relay hub task with the given configuration.
    pub fn with_config(config: RelayConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let reachable = Arc::new(AtomicBool::new(true));

        let hub = Hub {
            peers: HashMap::new(),
            rooms: BTreeMap::new(),
            reachable: Arc::clone(&reachable),
            config: config.clone(),
            commands: tx.downgrade(),
            receiver: rx,
        };
        tokio::spawn(hub.run());

        Self {
            commands: tx,
            reachable,
            epoch: Instant::now(),
            config,
        }
    }

    /// Creates a new, unconnected provider handle for one peer.
    pub fn provider(&self) -> MemoryProvider {
        let (notify, _) = broadcast::channel(self.config.notification_capacity);
        MemoryProvider {
            commands: self.commands.clone(),
            view: SharedView::default(),
            notify,
            epoch: self.epoch,
        }
    }

    /// Makes subsequent connects fail (`false`) or succeed (`true`).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Drops a peer as if its network went away.
    pub fn drop_connection(&self, peer: &PeerId) {
        let _ = self.commands.send(HubCommand::Disconnect { peer: peer.clone() });
    }
}

// ---------------------------------------------------------------------------
// MemoryProvider
// ---------------------------------------------------------------------------

/// One peer's handle onto a [`MemoryRelay`].
pub struct MemoryProvider {
    commands: mpsc::UnboundedSender<HubCommand>,
    view: SharedView,
    notify: broadcast::Sender<TransportNotification>,
    epoch: Instant,
}

impl MemoryProvider {
    fn peer(&self) -> Result<PeerId, TransportError> {
        lock(&self.view)
            .local_id
            .clone()
            .ok_or(TransportError::NotConnected)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> HubCommand,
    ) -> Result<T, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .map_err(|_| TransportError::Shutdown)?;
        reply_rx.await.map_err(|_| TransportError::Shutdown)?
    }
}

impl TransportProvider for MemoryProvider {
    async fn connect(&self, user_id: &str) -> Result<(), TransportError> {
        if lock(&self.view).local_id.is_some() {
            return Err(TransportError::ConnectFailed(
                "already connected".into(),
            ));
        }
        let view = Arc::clone(&self.view);
        let notify = self.notify.clone();
        let user_id = user_id.to_string();
        self.request(|reply| HubCommand::Connect {
            user_id,
            view,
            notify,
            reply,
        })
        .await
    }

    fn disconnect(&self) {
        let peer = {
            let mut view = lock(&self.view);
            view.room = None;
            view.local_id.take()
        };
        if let Some(peer) = peer {
            let _ = self.commands.send(HubCommand::Disconnect { peer });
        }
    }

    async fn create_room(
        &self,
        name: &str,
        options: CreateRoomOptions,
    ) -> Result<(), TransportError> {
        let peer = self.peer()?;
        let name = name.to_string();
        self.request(|reply| HubCommand::CreateRoom {
            peer,
            name,
            options,
            reply,
        })
        .await
    }

    async fn join_room(&self, name: &str) -> Result<(), TransportError> {
        let peer = self.peer()?;
        let name = name.to_string();
        self.request(|reply| HubCommand::JoinRoom { peer, name, reply })
            .await
    }

    fn leave_room(&self) {
        let peer = {
            let mut view = lock(&self.view);
            match view.room.take() {
                Some(_) => view.local_id.clone(),
                None => None,
            }
        };
        if let Some(peer) = peer {
            let _ = self.commands.send(HubCommand::LeaveRoom { peer });
        }
    }

    async fn room_list(&self) -> Result<Vec<RoomInfo>, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(HubCommand::ListRooms { reply: reply_tx })
            .map_err(|_| TransportError::Shutdown)?;
        reply_rx.await.map_err(|_| TransportError::Shutdown)
    }

    fn refresh_room_list(&self) {
        if let Ok(peer) = self.peer() {
            let _ = self.commands.send(HubCommand::RefreshRoomList { peer });
        }
    }

    fn send_event(
        &self,
        code: u8,
        data: &[u8],
        options: SendOptions,
    ) -> Result<(), TransportError> {
        let peer = {
            let view = lock(&self.view);
            if view.room.is_none() {
                return Err(TransportError::NotInRoom);
            }
            view.local_id.clone().ok_or(TransportError::NotConnected)?
        };
        self.commands
            .send(HubCommand::Raise {
                peer,
                code,
                data: data.to_vec(),
                receivers: options.receivers,
            })
            .map_err(|_| TransportError::Shutdown)
    }

    fn local_player_id(&self) -> Option<PeerId> {
        lock(&self.view).local_id.clone()
    }

    fn server_time(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn is_master_client(&self) -> bool {
        let view = lock(&self.view);
        match (&view.local_id, &view.room) {
            (Some(me), Some(room)) => room.master.as_ref() == Some(me),
            _ => false,
        }
    }

    fn actors(&self) -> BTreeMap<PeerId, Actor> {
        lock(&self.view)
            .room
            .as_ref()
            .map(|room| room.actors.clone())
            .unwrap_or_default()
    }

    fn current_room(&self) -> Option<String> {
        lock(&self.view).room.as_ref().map(|room| room.name.clone())
    }

    fn room_property(&self, key: &str) -> Option<serde_json::Value> {
        lock(&self.view)
            .room
            .as_ref()
            .and_then(|room| room.properties.get(key).cloned())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportNotification> {
        self.notify.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Hub actor
// ---------------------------------------------------------------------------

struct PeerLink {
    view: SharedView,
    notify: broadcast::Sender<TransportNotification>,
    room: Option<String>,
    in_lobby: bool,
}

impl PeerLink {
    fn emit_state(&self, state: RelayState) {
        let _ = self
            .notify
            .send(TransportNotification::StateChanged(state.into()));
    }

    fn emit(&self, notification: TransportNotification) {
        let _ = self.notify.send(notification);
    }
}

struct HubRoom {
    name: String,
    options: CreateRoomOptions,
    actors: BTreeMap<PeerId, Actor>,
    master: Option<PeerId>,
    next_actor_nr: u32,
    /// Bumped every time the room becomes empty; a pending reap only
    /// fires if the generation still matches.
    empty_generation: u64,
}

impl HubRoom {
    fn view(&self) -> RoomView {
        RoomView {
            name: self.name.clone(),
            actors: self.actors.clone(),
            master: self.master.clone(),
            properties: self.options.custom_properties.clone(),
        }
    }

    fn info(&self) -> RoomInfo {
        let custom_properties = self
            .options
            .props_listed_in_lobby
            .iter()
            .filter_map(|key| {
                self.options
                    .custom_properties
                    .get(key)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect();
        RoomInfo {
            id: self.name.clone(),
            name: self.name.clone(),
            player_count: self.actors.len(),
            max_players: self.options.max_players,
            is_open: self.options.is_open,
            custom_properties,
        }
    }

    /// The remaining actor that joined first.
    fn oldest_actor(&self) -> Option<PeerId> {
        self.actors
            .values()
            .min_by_key(|actor| actor.actor_nr)
            .map(|actor| actor.id.clone())
    }
}

struct Hub {
    peers: HashMap<PeerId, PeerLink>,
    rooms: BTreeMap<String, HubRoom>,
    reachable: Arc<AtomicBool>,
    config: RelayConfig,
    commands: mpsc::WeakUnboundedSender<HubCommand>,
    receiver: mpsc::UnboundedReceiver<HubCommand>,
}

impl Hub {
    async fn run(mut self) {
        tracing::info!("memory relay started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                HubCommand::Connect {
                    user_id,
                    view,
                    notify,
                    reply,
                } => {
                    let result = self.handle_connect(user_id, view, notify);
                    let _ = reply.send(result);
                }
                HubCommand::Disconnect { peer } => self.handle_disconnect(&peer),
                HubCommand::CreateRoom {
                    peer,
                    name,
                    options,
                    reply,
                } => {
                    let result = self.handle_create(&peer, name, options);
                    let _ = reply.send(result);
                }
                HubCommand::JoinRoom { peer, name, reply } => {
                    let result = self.handle_join(&peer, &name);
                    let _ = reply.send(result);
                }
                HubCommand::LeaveRoom { peer } => self.handle_leave(&peer, true),
                HubCommand::Raise {
                    peer,
                    code,
                    data,
                    receivers,
                } => self.handle_raise(&peer, code, data, receivers),
                HubCommand::ListRooms { reply } => {
                    let _ = reply.send(self.listing());
                }
                HubCommand::RefreshRoomList { peer } => {
                    if let Some(link) = self.peers.get(&peer) {
                        link.emit(TransportNotification::RoomListUpdated(
                            self.listing(),
                        ));
                    }
                }
                HubCommand::ReapRoom { name, generation } => {
                    self.handle_reap(&name, generation)
                }
            }
        }

        tracing::info!("memory relay stopped");
    }

    fn handle_connect(
        &mut self,
        user_id: String,
        view: SharedView,
        notify: broadcast::Sender<TransportNotification>,
    ) -> Result<(), TransportError> {
        let _ = notify.send(TransportNotification::StateChanged(
            RelayState::ConnectingToMasterServer.into(),
        ));

        if !self.reachable.load(Ordering::SeqCst) {
            let _ = notify.send(TransportNotification::StateChanged(
                RelayState::Error.into(),
            ));
            return Err(TransportError::ConnectFailed("relay unreachable".into()));
        }

        let peer = PeerId::new(user_id);
        if self.peers.contains_key(&peer) {
            let _ = notify.send(TransportNotification::StateChanged(
                RelayState::Error.into(),
            ));
            return Err(TransportError::ConnectFailed(format!(
                "user id {peer} already connected"
            )));
        }

        lock(&view).local_id = Some(peer.clone());
        let link = PeerLink {
            view,
            notify,
            room: None,
            in_lobby: self.config.auto_join_lobby,
        };
        link.emit_state(RelayState::ConnectedToMaster);
        if link.in_lobby {
            link.emit_state(RelayState::JoinedLobby);
            link.emit(TransportNotification::RoomListUpdated(self.listing()));
        }
        self.peers.insert(peer.clone(), link);

        tracing::info!(%peer, "peer connected");
        Ok(())
    }

    fn handle_disconnect(&mut self, peer: &PeerId) {
        if !self.peers.contains_key(peer) {
            return;
        }
        self.handle_leave(peer, false);
        if let Some(link) = self.peers.remove(peer) {
            {
                let mut view = lock(&link.view);
                view.local_id = None;
                view.room = None;
            }
            link.emit_state(RelayState::Disconnected);
        }
        tracing::info!(%peer, "peer disconnected");
    }

    fn handle_create(
        &mut self,
        peer: &PeerId,
        name: String,
        options: CreateRoomOptions,
    ) -> Result<(), TransportError> {
        let link = self.peers.get(peer).ok_or(TransportError::NotConnected)?;
        if let Some(current) = &link.room {
            return Err(TransportError::AlreadyInRoom(current.clone()));
        }
        if self.rooms.contains_key(&name) {
            return Err(TransportError::RoomAlreadyExists(name));
        }

        let actor = Actor {
            id: peer.clone(),
            name: peer.to_string(),
            actor_nr: 1,
        };
        let mut actors = BTreeMap::new();
        actors.insert(peer.clone(), actor);
        let room = HubRoom {
            name: name.clone(),
            options,
            actors,
            master: Some(peer.clone()),
            next_actor_nr: 2,
            empty_generation: 0,
        };
        self.rooms.insert(name.clone(), room);

        if let Some(link) = self.peers.get_mut(peer) {
            link.room = Some(name.clone());
            link.in_lobby = false;
            link.emit_state(RelayState::Joined);
        }
        self.sync_views(&name);
        self.push_listing();

        tracing::info!(room = %name, %peer, "room created");
        Ok(())
    }

    fn handle_join(
        &mut self,
        peer: &PeerId,
        name: &str,
    ) -> Result<(), TransportError> {
        let link = self.peers.get(peer).ok_or(TransportError::NotConnected)?;
        if let Some(current) = &link.room {
            return Err(TransportError::AlreadyInRoom(current.clone()));
        }
        let room = self
            .rooms
            .get_mut(name)
            .ok_or_else(|| TransportError::RoomNotFound(name.to_string()))?;
        if !room.options.is_open {
            return Err(TransportError::RoomClosed(name.to_string()));
        }
        if room.actors.len() >= room.options.max_players {
            return Err(TransportError::RoomFull(name.to_string()));
        }

        let actor = Actor {
            id: peer.clone(),
            name: peer.to_string(),
            actor_nr: room.next_actor_nr,
        };
        room.next_actor_nr += 1;
        room.actors.insert(peer.clone(), actor.clone());
        // An orphaned room hands authority to whoever arrives first.
        if room.master.is_none() {
            room.master = Some(peer.clone());
            tracing::info!(room = %name, %peer, "master assigned to joiner");
        }
        let others: Vec<PeerId> = room
            .actors
            .keys()
            .filter(|id| *id != peer)
            .cloned()
            .collect();

        if let Some(link) = self.peers.get_mut(peer) {
            link.room = Some(name.to_string());
            link.in_lobby = false;
        }
        self.sync_views(name);
        if let Some(link) = self.peers.get(peer) {
            link.emit_state(RelayState::Joined);
        }
        for other in &others {
            if let Some(link) = self.peers.get(other) {
                link.emit(TransportNotification::PlayerJoined(actor.clone()));
            }
        }
        self.push_listing();

        tracing::info!(room = %name, %peer, actor_nr = actor.actor_nr, "peer joined room");
        Ok(())
    }

    /// Removes `peer` from its room. `to_lobby` is false when the peer is
    /// disconnecting and should not receive a lobby state.
    fn handle_leave(&mut self, peer: &PeerId, to_lobby: bool) {
        let Some(link) = self.peers.get_mut(peer) else {
            return;
        };
        let Some(name) = link.room.take() else {
            return;
        };
        lock(&link.view).room = None;
        if to_lobby {
            if self.config.auto_join_lobby {
                link.in_lobby = true;
                link.emit_state(RelayState::JoinedLobby);
            } else {
                link.emit_state(RelayState::ConnectedToMaster);
            }
        }

        let Some(room) = self.rooms.get_mut(&name) else {
            return;
        };
        room.actors.remove(peer);

        let mut new_master = None;
        if room.master.as_ref() == Some(peer) {
            room.master = room.oldest_actor();
            new_master = room.master.clone();
        }

        if room.actors.is_empty() {
            let ttl = room.options.empty_room_ttl;
            match ttl {
                Some(ttl) => {
                    room.empty_generation += 1;
                    let generation = room.empty_generation;
                    self.schedule_reap(name.clone(), generation, ttl);
                }
                None => {
                    self.rooms.remove(&name);
                    tracing::info!(room = %name, "room removed (empty)");
                }
            }
        } else {
            let remaining: Vec<PeerId> = room.actors.keys().cloned().collect();
            self.sync_views(&name);
            for other in &remaining {
                if let Some(link) = self.peers.get(other) {
                    link.emit(TransportNotification::PlayerLeft(peer.clone()));
                    if let Some(master) = &new_master {
                        link.emit(TransportNotification::MasterClientSwitched(
                            master.clone(),
                        ));
                    }
                }
            }
            if let Some(master) = &new_master {
                tracing::info!(room = %name, %master, "master client switched");
            }
        }

        self.push_listing();
        tracing::info!(room = %name, %peer, "peer left room");
    }

    fn handle_raise(
        &self,
        peer: &PeerId,
        code: u8,
        data: Vec<u8>,
        receivers: ReceiverGroup,
    ) {
        let room = self
            .peers
            .get(peer)
            .and_then(|link| link.room.as_ref())
            .and_then(|name| self.rooms.get(name));
        let Some(room) = room else {
            tracing::debug!(%peer, code, "event from peer outside a room, dropping");
            return;
        };

        let targets: Vec<&PeerId> = match receivers {
            ReceiverGroup::Others => {
                room.actors.keys().filter(|id| *id != peer).collect()
            }
            ReceiverGroup::All => room.actors.keys().collect(),
            ReceiverGroup::MasterClient => room.master.iter().collect(),
        };

        for target in targets {
            if let Some(link) = self.peers.get(target) {
                link.emit(TransportNotification::Event {
                    code,
                    data: data.clone(),
                    sender: peer.clone(),
                });
            }
        }
    }

    fn handle_reap(&mut self, name: &str, generation: u64) {
        let expired = self.rooms.get(name).is_some_and(|room| {
            room.actors.is_empty() && room.empty_generation == generation
        });
        if expired {
            self.rooms.remove(name);
            self.push_listing();
            tracing::info!(room = %name, "room reaped (empty ttl elapsed)");
        }
    }

    fn schedule_reap(&self, name: String, generation: u64, ttl: Duration) {
        let Some(commands) = self.commands.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = commands.send(HubCommand::ReapRoom { name, generation });
        });
    }

    fn sync_views(&self, name: &str) {
        let Some(room) = self.rooms.get(name) else {
            return;
        };
        let view = room.view();
        for id in room.actors.keys() {
            if let Some(link) = self.peers.get(id) {
                lock(&link.view).room = Some(view.clone());
            }
        }
    }

    fn listing(&self) -> Vec<RoomInfo> {
        self.rooms
            .values()
            .filter(|room| room.options.is_visible)
            .map(HubRoom::info)
            .collect()
    }

    fn push_listing(&self) {
        let listing = self.listing();
        for link in self.peers.values().filter(|link| link.in_lobby) {
            link.emit(TransportNotification::RoomListUpdated(listing.clone()));
        }
    }
}
