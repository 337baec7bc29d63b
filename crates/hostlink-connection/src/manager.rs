//! The connection manager: normalized state plus automatic reconnection.
//!
//! State only changes when the relay says so ([`handle_state_change`]).
//! `connect` and `disconnect` ask the relay to move, they never write the
//! state themselves, except that a failed `connect` whose failure the relay
//! did not report is recorded as `Error`.
//!
//! # Reconnect rules
//!
//! ```text
//! Disconnected / Error ──→ schedule (at most one timer pending)
//! any other state      ──→ cancel pending timer
//! explicit disconnect  ──→ suppress until the next explicit connect
//! ```
//!
//! [`handle_state_change`]: ConnectionManager::handle_state_change

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use hostlink_transport::{ConnectionState, TransportProvider};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ReconnectPolicy;
use crate::policy::guest_id;

#[derive(Default)]
struct Inner {
    /// Set by `disconnect()`, cleared by `connect()`.
    explicit_disconnect: bool,
    /// A provider connect has been issued and the relay has not yet
    /// reported a settled state.
    connect_in_flight: bool,
    pending: Option<JoinHandle<()>>,
    /// Reconnect attempts since the last settled connection.
    attempts: u32,
    /// Id of the most recent connect, reused by reconnects when the policy
    /// has no resolver.
    last_user_id: Option<String>,
}

/// Tracks the relay connection and reconnects after unexpected drops.
///
/// Always handled through an `Arc`; reconnect timers hold a strong
/// reference while they wait.
pub struct ConnectionManager<P> {
    provider: Arc<P>,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    inner: Mutex<Inner>,
    this: Weak<Self>,
}

impl<P: TransportProvider> ConnectionManager<P> {
    pub fn new(provider: Arc<P>, policy: ReconnectPolicy) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        Arc::new_cyclic(|this| Self {
            provider,
            policy,
            state_tx,
            inner: Mutex::new(Inner::default()),
            this: this.clone(),
        })
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// The last state reported by the relay.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watches state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Connected to the relay in any settled state.
    pub fn is_connected(&self) -> bool {
        is_settled(self.state())
    }

    /// Reconnect attempts made since the connection last settled.
    ///
    /// A value that keeps climbing means the relay stays unreachable; the
    /// UI decides when to tell the user.
    pub fn reconnect_attempts(&self) -> u32 {
        self.lock().attempts
    }

    /// Whether a reconnect timer is waiting to fire.
    pub fn reconnect_pending(&self) -> bool {
        self.lock()
            .pending
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Connects under `user_id`.
    ///
    /// Returns `false` without side effects unless the state is
    /// Disconnected or Error and no connect is already in flight. Relay
    /// failures are not returned as errors: they show up as an `Error`
    /// state (and a `false` return).
    pub async fn connect(&self, user_id: &str) -> bool {
        {
            let mut inner = self.lock();
            let state = self.state();
            if !state.is_down() || inner.connect_in_flight {
                tracing::debug!(%state, "connect ignored, already connected or connecting");
                return false;
            }
            inner.connect_in_flight = true;
            inner.explicit_disconnect = false;
            inner.last_user_id = Some(user_id.to_string());
            if let Some(task) = inner.pending.take() {
                task.abort();
            }
        }

        tracing::info!(user_id, "connecting to relay");
        match self.provider.connect(user_id).await {
            Ok(()) => true,
            Err(error) => {
                self.lock().connect_in_flight = false;
                tracing::warn!(user_id, %error, "relay connect failed");
                if !self.is_connected() {
                    self.handle_state_change(ConnectionState::Error);
                }
                false
            }
        }
    }

    /// Leaves the relay and suppresses automatic reconnection until the
    /// next [`connect`](Self::connect).
    pub fn disconnect(&self) {
        {
            let mut inner = self.lock();
            inner.explicit_disconnect = true;
            inner.connect_in_flight = false;
            if let Some(task) = inner.pending.take() {
                task.abort();
                tracing::debug!("pending reconnect cancelled");
            }
        }
        self.provider.disconnect();
        tracing::info!("disconnected on request, auto-reconnect suppressed");
    }

    /// Records a state reported by the relay and drives the reconnect timer.
    pub fn handle_state_change(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(%previous, %state, "connection state changed");
        }

        let mut inner = self.lock();
        if state != ConnectionState::Connecting {
            inner.connect_in_flight = false;
        }

        if state.is_down() {
            self.schedule_reconnect(&mut inner);
            return;
        }

        if let Some(task) = inner.pending.take() {
            task.abort();
            tracing::debug!(%state, "pending reconnect cancelled");
        }
        if is_settled(state) && inner.attempts > 0 {
            tracing::info!(attempts = inner.attempts, "reconnected to relay");
            inner.attempts = 0;
        }
    }

    // -----------------------------------------------------------------------
    // Timer
    // -----------------------------------------------------------------------

    fn schedule_reconnect(&self, inner: &mut Inner) {
        if !self.policy.enabled {
            return;
        }
        if inner.explicit_disconnect {
            tracing::debug!("reconnect suppressed after explicit disconnect");
            return;
        }
        if inner.pending.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime, reconnect not scheduled");
            return;
        };

        let delay = self.policy.next_delay();
        tracing::info!(?delay, "reconnect scheduled");
        inner.pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            this.fire_reconnect().await;
        }));
    }

    async fn fire_reconnect(&self) {
        let resolved = self.policy.user_id();
        let (attempt, user_id) = {
            let mut inner = self.lock();
            inner.pending = None;
            if inner.explicit_disconnect || !self.state().is_down() {
                return;
            }
            inner.attempts += 1;
            let user_id = resolved
                .or_else(|| inner.last_user_id.clone())
                .unwrap_or_else(guest_id);
            (inner.attempts, user_id)
        };
        tracing::info!(attempt, %user_id, "reconnecting");
        self.connect(&user_id).await;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_settled(state: ConnectionState) -> bool {
    matches!(
        state,
        ConnectionState::ConnectedToMaster
            | ConnectionState::InLobby
            | ConnectionState::InRoom
    )
}
