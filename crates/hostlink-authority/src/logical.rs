//! Reference authoritative simulation for a wave shooter.
//!
//! Validates combat requests, tracks health, ammo and weapons per player,
//! and publishes every decision as an authority event. Rendering and
//! physics never enter here: a shot is valid if the shooter is alive and
//! has ammo, a hit is valid if both ends are alive.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use hostlink_protocol::{
    Codec, FireRequest, GameEvent, HitConfirmed, HitRequest, InboundEvent,
    InitialState, JsonCodec, PeerId, PlayerDied, PlayerRespawned, PlayerState,
    ReloadConfirmed, ShotFired, UpgradeApplied, UpgradeOffer, Vec3, WavePhase,
    WaveState, WeaponChanged,
};
use hostlink_transport::{Actor, TransportProvider};
use serde::{Deserialize, Serialize};

use crate::{
    AuthoritativeSimulation, AuthorityDispatcher, SimulationError, SimulationFactory,
    SimulationParams,
};

/// Rules for [`LogicalServer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicalServerConfig {
    /// Rounds per magazine, by weapon id.
    pub magazines: HashMap<String, u32>,
    /// Magazine size for weapons not listed in `magazines`.
    pub default_magazine: u32,
    /// Respawn positions, used in rotation.
    pub spawn_points: Vec<Vec3>,
    /// Upgrades offered between waves.
    pub upgrade_pool: Vec<String>,
    /// How many upgrades each offer contains.
    pub offers_per_wave: usize,
    /// Enemies per wave, multiplied by the wave number.
    pub enemies_per_wave: u32,
}

impl Default for LogicalServerConfig {
    fn default() -> Self {
        let magazines = [("Pistol", 12), ("Rifle", 30), ("Shotgun", 6)]
            .into_iter()
            .map(|(weapon, rounds)| (weapon.to_string(), rounds))
            .collect();
        Self {
            magazines,
            default_magazine: 10,
            spawn_points: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(10.0, 0.0, 10.0),
                Vec3::new(-10.0, 0.0, 10.0),
                Vec3::new(0.0, 0.0, -10.0),
            ],
            upgrade_pool: ["damage", "fire_rate", "max_ammo", "armor", "speed"]
                .into_iter()
                .map(String::from)
                .collect(),
            offers_per_wave: 3,
            enemies_per_wave: 5,
        }
    }
}

impl LogicalServerConfig {
    pub fn magazine(&self, weapon_id: &str) -> u32 {
        self.magazines
            .get(weapon_id)
            .copied()
            .unwrap_or(self.default_magazine)
    }
}

#[derive(Debug, Clone)]
struct Combatant {
    state: PlayerState,
    ammo: u32,
    upgrades: Vec<String>,
}

/// The bundled [`AuthoritativeSimulation`].
pub struct LogicalServer<P, C: Codec = JsonCodec> {
    dispatcher: Arc<AuthorityDispatcher<P, C>>,
    config: LogicalServerConfig,
    params: SimulationParams,
    players: BTreeMap<PeerId, Combatant>,
    wave: u32,
    next_spawn: usize,
    running: bool,
}

impl<P: TransportProvider, C: Codec> LogicalServer<P, C> {
    pub fn new(
        dispatcher: Arc<AuthorityDispatcher<P, C>>,
        config: LogicalServerConfig,
        params: SimulationParams,
    ) -> Self {
        Self {
            dispatcher,
            config,
            params,
            players: BTreeMap::new(),
            wave: 0,
            next_spawn: 0,
            running: false,
        }
    }

    /// A [`SimulationFactory`] that builds a `LogicalServer` per start.
    pub fn factory(
        dispatcher: Arc<AuthorityDispatcher<P, C>>,
        config: LogicalServerConfig,
    ) -> SimulationFactory {
        Arc::new(move |params: SimulationParams| {
            let server = Self::new(Arc::clone(&dispatcher), config.clone(), params);
            Ok::<Box<dyn AuthoritativeSimulation>, SimulationError>(Box::new(server))
        })
    }

    pub fn wave(&self) -> u32 {
        self.wave
    }

    pub fn player(&self, id: &PeerId) -> Option<&PlayerState> {
        self.players.get(id).map(|c| &c.state)
    }

    pub fn ammo(&self, id: &PeerId) -> Option<u32> {
        self.players.get(id).map(|c| c.ammo)
    }

    pub fn upgrades(&self, id: &PeerId) -> &[String] {
        self.players
            .get(id)
            .map(|c| c.upgrades.as_slice())
            .unwrap_or_default()
    }

    /// The full snapshot as it would be broadcast.
    pub fn snapshot(&self) -> InitialState {
        InitialState {
            players: self.players.values().map(|c| c.state.clone()).collect(),
            wave: self.wave,
            map_id: self.params.map_id.clone(),
            mode: self.params.mode.clone(),
        }
    }

    fn combatant(&self, state: PlayerState) -> Combatant {
        let ammo = self.config.magazine(&state.weapon_id);
        Combatant {
            state,
            ammo,
            upgrades: Vec::new(),
        }
    }

    fn broadcast(&self, event: GameEvent) {
        let code = event.code();
        if let Err(error) = self.dispatcher.broadcast(&event) {
            tracing::warn!(%code, %error, "authority broadcast failed");
        }
    }

    fn next_spawn_point(&mut self) -> Vec3 {
        if self.config.spawn_points.is_empty() {
            return Vec3::ZERO;
        }
        let point = self.config.spawn_points[self.next_spawn % self.config.spawn_points.len()];
        self.next_spawn += 1;
        point
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    fn on_fire(&mut self, shooter: &PeerId, req: FireRequest) {
        let Some(c) = self.players.get_mut(shooter) else {
            tracing::debug!(%shooter, "fire from unknown player");
            return;
        };
        if c.state.is_dead {
            tracing::debug!(%shooter, "fire rejected, shooter is dead");
            return;
        }
        if c.state.weapon_id != req.weapon_id {
            tracing::debug!(
                %shooter,
                weapon = %req.weapon_id,
                "fire rejected, weapon not equipped"
            );
            return;
        }
        if c.ammo == 0 {
            tracing::debug!(%shooter, "fire rejected, magazine empty");
            return;
        }
        c.ammo -= 1;
        let ammo = c.ammo;
        self.broadcast(GameEvent::FireConfirmed(ShotFired {
            shooter: shooter.clone(),
            weapon_id: req.weapon_id,
            origin: req.origin,
            direction: req.direction,
            ammo,
        }));
    }

    fn on_hit(&mut self, attacker: &PeerId, req: HitRequest) {
        let attacker_alive = self
            .players
            .get(attacker)
            .is_some_and(|c| !c.state.is_dead);
        if !attacker_alive {
            tracing::debug!(%attacker, "hit rejected, attacker unknown or dead");
            return;
        }
        let Some(target) = self.players.get_mut(&req.target) else {
            tracing::debug!(target = %req.target, "hit on unknown player");
            return;
        };
        if target.state.is_dead {
            tracing::debug!(target = %req.target, "hit rejected, target already dead");
            return;
        }

        let damage = if req.damage.is_nan() {
            0.0
        } else {
            req.damage.clamp(0.0, PlayerState::MAX_HEALTH)
        };
        target.state.set_health(target.state.health - damage);
        let health = target.state.health;
        let killed = health <= 0.0;
        if killed {
            target.state.is_dead = true;
        }

        self.broadcast(GameEvent::HitConfirmed(HitConfirmed {
            attacker: attacker.clone(),
            target: req.target.clone(),
            weapon_id: req.weapon_id,
            damage,
            health,
        }));
        if killed {
            tracing::info!(victim = %req.target, killer = %attacker, "player died");
            self.broadcast(GameEvent::PlayerDied(PlayerDied {
                victim: req.target,
                killer: Some(attacker.clone()),
            }));
        }
    }

    fn on_reload(&mut self, player: &PeerId, weapon_id: String) {
        let magazine = self.config.magazine(&weapon_id);
        let Some(c) = self.players.get_mut(player) else {
            return;
        };
        if c.state.is_dead || c.state.weapon_id != weapon_id {
            tracing::debug!(%player, weapon = %weapon_id, "reload rejected");
            return;
        }
        c.ammo = magazine;
        self.broadcast(GameEvent::ReloadConfirmed(ReloadConfirmed {
            player: player.clone(),
            weapon_id,
            ammo: magazine,
        }));
    }

    fn on_sync_weapon(&mut self, player: &PeerId, weapon_id: String) {
        let magazine = self.config.magazine(&weapon_id);
        let Some(c) = self.players.get_mut(player) else {
            return;
        };
        c.state.weapon_id = weapon_id.clone();
        c.ammo = magazine;
        self.broadcast(GameEvent::WeaponChanged(WeaponChanged {
            player: player.clone(),
            weapon_id,
        }));
    }

    fn on_respawn(&mut self, player: &PeerId) {
        let dead = self.players.get(player).is_some_and(|c| c.state.is_dead);
        if !dead {
            tracing::debug!(%player, "respawn rejected, player not dead");
            return;
        }
        let position = self.next_spawn_point();
        let Some(c) = self.players.get_mut(player) else {
            return;
        };
        c.ammo = self.config.magazine(&c.state.weapon_id);
        c.state.is_dead = false;
        c.state.set_health(PlayerState::MAX_HEALTH);
        c.state.position = position;
        self.broadcast(GameEvent::PlayerRespawned(PlayerRespawned {
            player: player.clone(),
            position,
            health: PlayerState::MAX_HEALTH,
        }));
    }

    fn on_select_upgrade(&mut self, player: &PeerId, upgrade_id: String) {
        if !self.config.upgrade_pool.contains(&upgrade_id) {
            tracing::debug!(%player, upgrade = %upgrade_id, "unknown upgrade");
            return;
        }
        let Some(c) = self.players.get_mut(player) else {
            return;
        };
        c.upgrades.push(upgrade_id.clone());
        self.broadcast(GameEvent::UpgradeApplied(UpgradeApplied {
            player: player.clone(),
            upgrade_id,
        }));
    }

    fn offers_for_wave(&self, wave: u32) -> Vec<String> {
        let pool = &self.config.upgrade_pool;
        if pool.is_empty() {
            return Vec::new();
        }
        let start = wave as usize % pool.len();
        pool.iter()
            .cycle()
            .skip(start)
            .take(self.config.offers_per_wave.min(pool.len()))
            .cloned()
            .collect()
    }
}

impl<P: TransportProvider, C: Codec> AuthoritativeSimulation for LogicalServer<P, C> {
    fn start(&mut self) -> Result<(), SimulationError> {
        let provider = Arc::clone(self.dispatcher.provider());
        if provider.current_room().is_none() {
            return Err(SimulationError::NotInRoom);
        }

        let actors = provider.actors();
        if self.params.takeover {
            // Whoever left with the old host is not carried over.
            let roster = std::mem::take(&mut self.params.roster);
            for state in roster.into_iter().filter(|s| actors.contains_key(&s.id)) {
                let combatant = self.combatant(state);
                self.players.insert(combatant.state.id.clone(), combatant);
            }
        }
        for actor in actors.into_values() {
            if !self.players.contains_key(&actor.id) {
                let combatant = self.combatant(PlayerState::new(actor.id.clone(), actor.name));
                self.players.insert(actor.id, combatant);
            }
        }

        self.running = true;
        tracing::info!(
            room = %self.params.room,
            players = self.players.len(),
            takeover = self.params.takeover,
            "logical server started"
        );
        // Clients resync from this, which matters most after a takeover.
        self.broadcast_state()
    }

    fn stop(&mut self) {
        self.running = false;
        tracing::info!(room = %self.params.room, "logical server stopped");
    }

    fn handle_request(&mut self, event: &InboundEvent) {
        if !self.running {
            return;
        }
        let Some(sender) = event.sender.peer().cloned() else {
            tracing::warn!(code = event.code, "request without a peer sender, ignoring");
            return;
        };
        let request = match event.decode(self.dispatcher.codec()) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(code = event.code, %sender, %error, "undecodable request");
                return;
            }
        };

        match request {
            GameEvent::Fire(req) => self.on_fire(&sender, req),
            GameEvent::Hit(req) => self.on_hit(&sender, req),
            GameEvent::Reload(req) => self.on_reload(&sender, req.weapon_id),
            GameEvent::SyncWeapon(req) => self.on_sync_weapon(&sender, req.weapon_id),
            GameEvent::RequestRespawn(_) => self.on_respawn(&sender),
            GameEvent::RequestInitialState(_) => {
                if let Err(error) = self.broadcast_state() {
                    tracing::warn!(%error, "snapshot broadcast failed");
                }
            }
            GameEvent::SelectUpgrade(req) => self.on_select_upgrade(&sender, req.upgrade_id),
            other => tracing::debug!(code = %other.code(), "not a request, ignoring"),
        }
    }

    fn player_joined(&mut self, actor: &Actor) {
        if self.players.contains_key(&actor.id) {
            return;
        }
        let combatant = self.combatant(PlayerState::new(actor.id.clone(), actor.name.clone()));
        self.players.insert(actor.id.clone(), combatant);
        tracing::debug!(player = %actor.id, "player added to simulation");
    }

    fn player_left(&mut self, id: &PeerId) {
        if self.players.remove(id).is_some() {
            tracing::debug!(player = %id, "player removed from simulation");
        }
    }

    fn broadcast_state(&mut self) -> Result<(), SimulationError> {
        self.dispatcher
            .broadcast(&GameEvent::InitialState(self.snapshot()))?;
        Ok(())
    }

    fn advance_wave(&mut self) -> Result<(), SimulationError> {
        self.wave = self.wave.saturating_add(1);
        let wave = self.wave;
        self.dispatcher.broadcast(&GameEvent::WaveState(WaveState {
            wave,
            phase: WavePhase::Spawning,
            enemies_remaining: self.config.enemies_per_wave.saturating_mul(wave),
        }))?;

        let options = self.offers_for_wave(wave);
        if options.is_empty() {
            return Ok(());
        }
        let alive: Vec<PeerId> = self
            .players
            .values()
            .filter(|c| !c.state.is_dead)
            .map(|c| c.state.id.clone())
            .collect();
        for player in alive {
            self.dispatcher.broadcast(&GameEvent::UpgradeOffer(UpgradeOffer {
                player,
                options: options.clone(),
            }))?;
        }
        tracing::info!(wave, "wave started");
        Ok(())
    }
}
