//! The player roster: one [`PlayerState`] per peer in the current room.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use hostlink_protocol::{PeerId, PlayerState};

use crate::Observable;

/// Holds the known state of every player in the room.
///
/// Written by the event router (authoritative facts, joins and leaves) and
/// by the session on teardown. Every read returns a copy.
#[derive(Default)]
pub struct PlayerStateManager {
    players: Mutex<BTreeMap<PeerId, PlayerState>>,
    on_player_joined: Observable<PlayerState>,
    on_player_updated: Observable<PlayerState>,
    on_player_left: Observable<PeerId>,
}

impl PlayerStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires with the new entry when a player is added.
    pub fn on_player_joined(&self) -> &Observable<PlayerState> {
        &self.on_player_joined
    }

    /// Fires with the resulting entry whenever a player's state changes.
    pub fn on_player_updated(&self) -> &Observable<PlayerState> {
        &self.on_player_updated
    }

    pub fn on_player_left(&self) -> &Observable<PeerId> {
        &self.on_player_left
    }

    /// Inserts or replaces a player. Returns `true` if the player was new.
    ///
    /// Health is clamped on the way in. Replacing an entry with an
    /// identical one changes nothing and fires nothing, so applying the
    /// same snapshot twice is the same as once.
    pub fn upsert(&self, mut state: PlayerState) -> bool {
        state.set_health(state.health);
        let previous = self.lock().insert(state.id.clone(), state.clone());
        match previous {
            None => {
                tracing::debug!(player = %state.id, "player added to roster");
                self.on_player_joined.notify(&state);
                true
            }
            Some(previous) if previous != state => {
                self.on_player_updated.notify(&state);
                false
            }
            Some(_) => false,
        }
    }

    /// Applies `change` to an existing player and returns the result.
    /// `None` if the player is unknown.
    pub fn update(
        &self,
        id: &PeerId,
        change: impl FnOnce(&mut PlayerState),
    ) -> Option<PlayerState> {
        let (before, after) = {
            let mut players = self.lock();
            let entry = players.get_mut(id)?;
            let before = entry.clone();
            change(entry);
            (before, entry.clone())
        };
        if before != after {
            self.on_player_updated.notify(&after);
        }
        Some(after)
    }

    /// Makes the roster match `players`: every entry is upserted and any
    /// player not listed is removed, firing `on_player_left`.
    pub fn apply_snapshot(&self, players: &[PlayerState]) {
        for player in players {
            self.upsert(player.clone());
        }
        let listed: BTreeSet<&PeerId> = players.iter().map(|p| &p.id).collect();
        let stale: Vec<PeerId> = self
            .lock()
            .keys()
            .filter(|id| !listed.contains(id))
            .cloned()
            .collect();
        for id in &stale {
            self.remove(id);
        }
    }

    pub fn remove(&self, id: &PeerId) -> Option<PlayerState> {
        let removed = self.lock().remove(id);
        if removed.is_some() {
            tracing::debug!(player = %id, "player removed from roster");
            self.on_player_left.notify(id);
        }
        removed
    }

    pub fn get(&self, id: &PeerId) -> Option<PlayerState> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.lock().contains_key(id)
    }

    /// All players, ordered by peer id.
    pub fn snapshot(&self) -> Vec<PlayerState> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry without firing `on_player_left`; used when the
    /// whole session goes away.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn clear_observers(&self) {
        self.on_player_joined.clear();
        self.on_player_updated.clear();
        self.on_player_left.clear();
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PeerId, PlayerState>> {
        self.players.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
