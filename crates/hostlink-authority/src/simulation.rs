//! The authoritative simulation seam and its single-instance manager.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use hostlink_protocol::{InboundEvent, PeerId, PlayerState};
use hostlink_transport::Actor;

use crate::SimulationError;

/// Game rules run by the master client.
///
/// The simulation reacts to requests and publishes its decisions through an
/// [`AuthorityDispatcher`](crate::AuthorityDispatcher). It is only ever
/// called from one thread at a time.
pub trait AuthoritativeSimulation: Send {
    /// Called once before any other input.
    fn start(&mut self) -> Result<(), SimulationError>;

    fn stop(&mut self);

    /// A request from a peer, or from the host itself through loopback.
    fn handle_request(&mut self, event: &InboundEvent);

    fn player_joined(&mut self, actor: &Actor);

    fn player_left(&mut self, id: &PeerId);

    /// Broadcasts the full snapshot.
    fn broadcast_state(&mut self) -> Result<(), SimulationError>;

    /// Moves to the next wave, for games that have them.
    fn advance_wave(&mut self) -> Result<(), SimulationError> {
        Ok(())
    }
}

/// What a simulation is started with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationParams {
    pub room: String,
    pub map_id: Option<String>,
    pub mode: Option<String>,
    /// Attaching to a room whose previous host left, rather than one this
    /// peer just created.
    pub takeover: bool,
    /// Roster known to this peer at start time. Seeds player state in
    /// takeover mode.
    pub roster: Vec<PlayerState>,
}

/// Builds a simulation for the given parameters.
pub type SimulationFactory = Arc<
    dyn Fn(SimulationParams) -> Result<Box<dyn AuthoritativeSimulation>, SimulationError>
        + Send
        + Sync,
>;

enum Input {
    Request(InboundEvent),
    Joined(Actor),
    Left(PeerId),
}

// ---------------------------------------------------------------------------
// LocalServerManager
// ---------------------------------------------------------------------------

/// Owns the one simulation this peer may run.
///
/// Inputs are queued and drained by whoever holds the simulation, so a
/// simulation broadcast that loops back into a new request is processed
/// after the current input instead of deadlocking.
pub struct LocalServerManager {
    factory: SimulationFactory,
    running: AtomicBool,
    simulation: Mutex<Option<Box<dyn AuthoritativeSimulation>>>,
    queue: Mutex<VecDeque<Input>>,
}

impl LocalServerManager {
    pub fn new(factory: SimulationFactory) -> Self {
        Self {
            factory,
            running: AtomicBool::new(false),
            simulation: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Builds and starts a simulation. Returns `Ok(false)` if one is
    /// already running.
    ///
    /// # Errors
    /// Whatever the factory or the simulation's `start` returns. The
    /// running flag is reset first, so the caller can retry.
    pub fn start(&self, params: SimulationParams) -> Result<bool, SimulationError> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!(room = %params.room, "simulation already running");
            return Ok(false);
        }

        let room = params.room.clone();
        let takeover = params.takeover;
        let started = (self.factory)(params).and_then(|mut simulation| {
            simulation.start()?;
            Ok(simulation)
        });

        match started {
            Ok(simulation) => {
                *self.lock_simulation() = Some(simulation);
                tracing::info!(%room, takeover, "local simulation started");
                self.drain();
                Ok(true)
            }
            Err(error) => {
                self.running.store(false, Ordering::SeqCst);
                self.lock_queue().clear();
                tracing::error!(%room, %error, "local simulation failed to start");
                Err(error)
            }
        }
    }

    /// Stops and drops the running simulation, if any.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let simulation = self.lock_simulation().take();
        self.lock_queue().clear();
        if let Some(mut simulation) = simulation {
            simulation.stop();
            tracing::info!("local simulation stopped");
        }
    }

    pub fn handle_request(&self, event: InboundEvent) {
        self.submit(Input::Request(event));
    }

    pub fn player_joined(&self, actor: Actor) {
        self.submit(Input::Joined(actor));
    }

    pub fn player_left(&self, id: PeerId) {
        self.submit(Input::Left(id));
    }

    /// Asks the running simulation to rebroadcast its snapshot.
    pub fn broadcast_state(&self) -> Result<(), SimulationError> {
        self.run(|simulation| simulation.broadcast_state())
            .unwrap_or(Ok(()))
    }

    /// Moves the running simulation to its next wave.
    pub fn advance_wave(&self) -> Result<(), SimulationError> {
        self.run(|simulation| simulation.advance_wave())
            .unwrap_or(Ok(()))
    }

    /// Runs `f` against the simulation, then drains anything it queued.
    fn run<R>(&self, f: impl FnOnce(&mut dyn AuthoritativeSimulation) -> R) -> Option<R> {
        let result = {
            let mut slot = self.lock_simulation();
            slot.as_mut().map(|simulation| f(simulation.as_mut()))
        };
        self.drain();
        result
    }

    fn submit(&self, input: Input) {
        if !self.is_running() {
            tracing::trace!("no simulation running, input ignored");
            return;
        }
        self.lock_queue().push_back(input);
        self.drain();
    }

    fn drain(&self) {
        loop {
            let mut slot = match self.simulation.try_lock() {
                Ok(slot) => slot,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                // Held further up this call stack, or by another thread.
                // The holder drains the queue before it lets go.
                Err(TryLockError::WouldBlock) => return,
            };
            // Still starting: `start` drains once the simulation is in place.
            let Some(simulation) = slot.as_mut() else {
                return;
            };
            while let Some(input) = self.pop() {
                match input {
                    Input::Request(event) => simulation.handle_request(&event),
                    Input::Joined(actor) => simulation.player_joined(&actor),
                    Input::Left(id) => simulation.player_left(&id),
                }
            }
            drop(slot);
            // Something may have been queued between the last pop and unlock.
            if self.lock_queue().is_empty() {
                return;
            }
        }
    }

    fn pop(&self) -> Option<Input> {
        self.lock_queue().pop_front()
    }

    fn lock_simulation(&self) -> MutexGuard<'_, Option<Box<dyn AuthoritativeSimulation>>> {
        self.simulation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<Input>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
