//! A relay stand-in that records every publish.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use hostlink_authority::AuthorityDispatcher;
use hostlink_protocol::{GameEvent, InboundEvent, JsonCodec, PeerId};
use hostlink_transport::{
    Actor, CreateRoomOptions, ReceiverGroup, RoomInfo, SendOptions, TransportError,
    TransportNotification, TransportProvider,
};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub code: u8,
    pub data: Vec<u8>,
    pub options: SendOptions,
}

impl Published {
    pub fn decode(&self) -> GameEvent {
        GameEvent::decode(self.code, &self.data, &JsonCodec).expect("decodable publish")
    }
}

pub struct RecordingRelay {
    master: AtomicBool,
    local: Mutex<Option<PeerId>>,
    room: Mutex<Option<String>>,
    actors: Mutex<BTreeMap<PeerId, Actor>>,
    published: Mutex<Vec<Published>>,
    notifications: broadcast::Sender<TransportNotification>,
}

impl RecordingRelay {
    pub fn new(local: &str, master: bool) -> Arc<Self> {
        let (notifications, _) = broadcast::channel(16);
        Arc::new(Self {
            master: AtomicBool::new(master),
            local: Mutex::new(Some(PeerId::new(local))),
            room: Mutex::new(Some("arena".into())),
            actors: Mutex::new(BTreeMap::new()),
            published: Mutex::new(Vec::new()),
            notifications,
        })
    }

    pub fn set_master(&self, master: bool) {
        self.master.store(master, Ordering::SeqCst);
    }

    pub fn set_local(&self, id: Option<&str>) {
        *self.local.lock().unwrap() = id.map(PeerId::new);
    }

    pub fn set_room(&self, room: Option<&str>) {
        *self.room.lock().unwrap() = room.map(String::from);
    }

    pub fn add_actor(&self, id: &str) {
        let mut actors = self.actors.lock().unwrap();
        let actor_nr = actors.len() as u32 + 1;
        actors.insert(
            PeerId::new(id),
            Actor {
                id: PeerId::new(id),
                name: id.to_string(),
                actor_nr,
            },
        );
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_to(&self, receivers: ReceiverGroup) -> Vec<Published> {
        self.published()
            .into_iter()
            .filter(|p| p.options.receivers == receivers)
            .collect()
    }

    pub fn take_published(&self) -> Vec<Published> {
        std::mem::take(&mut *self.published.lock().unwrap())
    }
}

impl TransportProvider for RecordingRelay {
    async fn connect(&self, _user_id: &str) -> Result<(), TransportError> {
        Ok(())
    }
    fn disconnect(&self) {}
    async fn create_room(
        &self,
        _name: &str,
        _options: CreateRoomOptions,
    ) -> Result<(), TransportError> {
        Ok(())
    }
    async fn join_room(&self, _name: &str) -> Result<(), TransportError> {
        Ok(())
    }
    fn leave_room(&self) {}
    async fn room_list(&self) -> Result<Vec<RoomInfo>, TransportError> {
        Ok(Vec::new())
    }
    fn send_event(
        &self,
        code: u8,
        data: &[u8],
        options: SendOptions,
    ) -> Result<(), TransportError> {
        if self.room.lock().unwrap().is_none() {
            return Err(TransportError::NotInRoom);
        }
        self.published.lock().unwrap().push(Published {
            code,
            data: data.to_vec(),
            options,
        });
        Ok(())
    }
    fn local_player_id(&self) -> Option<PeerId> {
        self.local.lock().unwrap().clone()
    }
    fn server_time(&self) -> u64 {
        0
    }
    fn is_master_client(&self) -> bool {
        self.master.load(Ordering::SeqCst)
    }
    fn actors(&self) -> BTreeMap<PeerId, Actor> {
        self.actors.lock().unwrap().clone()
    }
    fn current_room(&self) -> Option<String> {
        self.room.lock().unwrap().clone()
    }
    fn room_property(&self, _key: &str) -> Option<serde_json::Value> {
        None
    }
    fn subscribe(&self) -> broadcast::Receiver<TransportNotification> {
        self.notifications.subscribe()
    }
}

/// A dispatcher whose local dispatch is captured into a list.
pub fn dispatcher(
    relay: &Arc<RecordingRelay>,
) -> (Arc<AuthorityDispatcher<RecordingRelay>>, Arc<Mutex<Vec<InboundEvent>>>) {
    let dispatcher = Arc::new(AuthorityDispatcher::new(Arc::clone(relay)));
    let looped = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&looped);
    dispatcher.set_local_dispatch(move |event| sink.lock().unwrap().push(event));
    (dispatcher, looped)
}
