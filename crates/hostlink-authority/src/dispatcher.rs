//! Outbound dispatch: who publishes what, and when the host loops back.
//!
//! The relay can publish to others, to everyone, or to the master client,
//! but it never delivers a peer's own publish back to itself. The host is
//! both a player and the authority, so it closes the loop by hand:
//!
//! | call                         | master                          | not master                 |
//! |------------------------------|---------------------------------|----------------------------|
//! | `send_request`               | local dispatch as `Peer(me)`    | publish to `MasterClient`  |
//! | `broadcast_authority_event`  | publish to `Others` + local dispatch as `LocalAuthority` | publish to `Others` |
//! | `send_event` (system code)   | publish to `Others`             | publish to `Others`        |
//!
//! Master status is queried from the relay on every call, never cached.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hostlink_protocol::{
    Codec, EventKind, GameEvent, InboundEvent, JsonCodec, Sender, classify,
};
use hostlink_transport::{
    ReceiverGroup, SendOptions, TransportError, TransportProvider,
};

use crate::DispatchError;

/// Receives events the host feeds back into its own pipeline.
pub type LocalDispatch = Arc<dyn Fn(InboundEvent) + Send + Sync>;

/// Routes outbound events by kind and authority role.
pub struct AuthorityDispatcher<P, C: Codec = JsonCodec> {
    provider: Arc<P>,
    codec: C,
    local_dispatch: Mutex<Option<LocalDispatch>>,
}

impl<P: TransportProvider> AuthorityDispatcher<P, JsonCodec> {
    pub fn new(provider: Arc<P>) -> Self {
        Self::with_codec(provider, JsonCodec)
    }
}

impl<P: TransportProvider, C: Codec> AuthorityDispatcher<P, C> {
    pub fn with_codec(provider: Arc<P>, codec: C) -> Self {
        Self {
            provider,
            codec,
            local_dispatch: Mutex::new(None),
        }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Installs the callback loopback events are delivered to.
    pub fn set_local_dispatch(&self, dispatch: impl Fn(InboundEvent) + Send + Sync + 'static) {
        *self.lock() = Some(Arc::new(dispatch));
    }

    pub fn clear_local_dispatch(&self) {
        *self.lock() = None;
    }

    /// Live master status from the relay.
    pub fn is_master(&self) -> bool {
        self.provider.is_master_client()
    }

    // -----------------------------------------------------------------------
    // Raw dispatch
    // -----------------------------------------------------------------------

    /// Sends a request to the authority.
    ///
    /// On the master this never touches the relay: the request goes
    /// straight to local dispatch with the local peer as sender. A code
    /// that is not a request is redirected to [`send_event`](Self::send_event).
    pub fn send_request(
        &self,
        code: u8,
        data: &[u8],
        reliable: bool,
    ) -> Result<(), TransportError> {
        if classify(code) != Some(EventKind::Request) {
            tracing::warn!(code, "send_request called with a non-request code, redirecting");
            return self.send_event(code, data, reliable);
        }

        if self.is_master() {
            let me = self
                .provider
                .local_player_id()
                .ok_or(TransportError::NotConnected)?;
            tracing::trace!(code, "request looped back on master");
            self.dispatch_locally(InboundEvent::new(code, data.to_vec(), Sender::Peer(me)));
            return Ok(());
        }

        self.publish(code, data, reliable, ReceiverGroup::MasterClient)
    }

    /// Publishes an authoritative fact to every other peer and, on the
    /// master, feeds it back locally as [`Sender::LocalAuthority`].
    pub fn broadcast_authority_event(
        &self,
        code: u8,
        data: &[u8],
        reliable: bool,
    ) -> Result<(), TransportError> {
        let published = self.publish(code, data, reliable, ReceiverGroup::Others);
        if self.is_master() {
            self.dispatch_locally(InboundEvent::new(
                code,
                data.to_vec(),
                Sender::LocalAuthority,
            ));
        }
        published
    }

    /// Sends by kind. Unknown codes are broadcast as authority events.
    pub fn send_event(
        &self,
        code: u8,
        data: &[u8],
        reliable: bool,
    ) -> Result<(), TransportError> {
        match classify(code) {
            Some(EventKind::Request) => self.send_request(code, data, reliable),
            Some(EventKind::Authority) => {
                self.broadcast_authority_event(code, data, reliable)
            }
            Some(EventKind::System) => {
                self.publish(code, data, reliable, ReceiverGroup::Others)
            }
            None => {
                tracing::warn!(code, "unknown event code, broadcasting as authority");
                self.broadcast_authority_event(code, data, reliable)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Typed dispatch
    // -----------------------------------------------------------------------

    /// Encodes and sends a request.
    pub fn request(&self, event: &GameEvent) -> Result<(), DispatchError> {
        let (code, data, reliable) = self.encode(event)?;
        Ok(self.send_request(code, &data, reliable)?)
    }

    /// Encodes and broadcasts an authority event.
    pub fn broadcast(&self, event: &GameEvent) -> Result<(), DispatchError> {
        let (code, data, reliable) = self.encode(event)?;
        Ok(self.broadcast_authority_event(code, &data, reliable)?)
    }

    /// Encodes and sends by kind.
    pub fn send(&self, event: &GameEvent) -> Result<(), DispatchError> {
        let (code, data, reliable) = self.encode(event)?;
        Ok(self.send_event(code, &data, reliable)?)
    }

    fn encode(&self, event: &GameEvent) -> Result<(u8, Vec<u8>, bool), DispatchError> {
        let code = event.code();
        let data = event.encode(&self.codec)?;
        Ok((code.as_u8(), data, code.default_reliable()))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn publish(
        &self,
        code: u8,
        data: &[u8],
        reliable: bool,
        receivers: ReceiverGroup,
    ) -> Result<(), TransportError> {
        let options = SendOptions { reliable, receivers };
        self.provider.send_event(code, data, options).inspect_err(|error| {
            tracing::warn!(code, ?receivers, %error, "publish failed");
        })
    }

    fn dispatch_locally(&self, event: InboundEvent) {
        // Cloned out so the callback can re-enter the dispatcher.
        let dispatch = self.lock().clone();
        match dispatch {
            Some(dispatch) => dispatch(event),
            None => tracing::warn!(code = event.code, "no local dispatch installed, event dropped"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<LocalDispatch>> {
        self.local_dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
