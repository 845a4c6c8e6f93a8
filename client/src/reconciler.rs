//! # Remote Entity Reconciler
//!
//! Turns the few position reports per second the relay forwards into smooth
//! per-frame motion for every player other than the local one.
//!
//! ## Smoothing Rule
//!
//! For each authoritative position received for an entity:
//! - If it is further than the teleport threshold on either axis, the entity
//!   snaps there and stops. Map loads and teleports never slide.
//! - Otherwise velocity is set to close a fixed fraction (the gain) of the gap
//!   per tick, capped at the maximum speed. Each tick moves the entity by its
//!   velocity and damps that velocity, so motion decays instead of oscillating.
//!
//! Velocities are in units per nominal tick. [`Reconciler::advance`] scales
//! both movement and damping by how many nominal ticks `dt` covers, and never
//! carries an entity past its target on either axis.
//!
//! Stance, frame, and facing are mirrored immediately on receipt.

use crate::vector::Vector2;
use log::debug;
use shared::{MapId, PlayerId, PlayerState, Stance};
use std::collections::HashMap;
use std::time::Duration;

/// Tuning for [`Reconciler`]
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Displacement on either axis above which an entity snaps
    pub teleport_threshold: f32,
    /// Fraction of the remaining gap covered per tick
    pub gain: f32,
    /// Cap on velocity magnitude, in units per tick
    pub max_speed: f32,
    /// Multiplier applied to velocity every tick
    pub damping: f32,
    /// Velocity components below this are treated as stopped
    pub rest_epsilon: f32,
    /// Duration of one nominal tick
    pub tick: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            teleport_threshold: 100.0,
            gain: 1.0 / 3.0,
            max_speed: 300.0,
            damping: 0.9,
            rest_epsilon: 0.1,
            tick: Duration::from_millis(16),
        }
    }
}

/// What applying one piece of remote state did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new entity was created at the reported position
    Spawned,
    /// The entity is gliding toward the reported position
    Smoothed,
    /// The entity jumped straight to the reported position
    Snapped,
    Removed,
    Ignored,
}

/// Local mirror of another player
#[derive(Debug, Clone)]
pub struct RemoteEntity {
    pub id: PlayerId,
    /// Where the entity is drawn
    pub position: Vector2,
    /// Last authoritative position
    pub target: Vector2,
    pub velocity: Vector2,
    /// Last authoritative state, position excluded
    pub player: PlayerState,
}

impl RemoteEntity {
    fn spawn(state: &PlayerState) -> Self {
        let at = Vector2::new(state.x, state.y);
        Self {
            id: state.id,
            position: at,
            target: at,
            velocity: Vector2::ZERO,
            player: state.clone(),
        }
    }

    pub fn stance(&self) -> &Stance {
        &self.player.stance
    }

    pub fn frame(&self) -> u32 {
        self.player.frame
    }

    pub fn flipped(&self) -> bool {
        self.player.flipped
    }

    pub fn name(&self) -> &str {
        &self.player.name
    }

    pub fn is_at_rest(&self) -> bool {
        self.velocity.is_zero()
    }
}

pub struct Reconciler {
    config: ReconcilerConfig,
    local_id: Option<PlayerId>,
    local_map: Option<MapId>,
    entities: HashMap<PlayerId, RemoteEntity>,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            local_id: None,
            local_map: None,
            entities: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// States carrying this id are never mirrored.
    pub fn set_local_player(&mut self, id: PlayerId) {
        self.local_id = Some(id);
        self.entities.remove(&id);
    }

    pub fn local_map(&self) -> Option<MapId> {
        self.local_map
    }

    /// Records the map the local player is in. Changing it drops every remote
    /// entity, since they all belonged to the previous map. Returns how many
    /// were dropped.
    pub fn set_local_map(&mut self, map: MapId) -> usize {
        if self.local_map == Some(map) {
            return 0;
        }

        self.local_map = Some(map);
        let dropped = self.entities.len();
        self.entities.clear();
        if dropped > 0 {
            debug!("Local map is now {}; dropped {} remote entities", map, dropped);
        }
        dropped
    }

    /// A `player_joined` entry. Existing entities are updated in place.
    pub fn apply_joined(&mut self, state: &PlayerState) -> ReconcileOutcome {
        self.upsert(state)
    }

    /// A `player_update`. An unknown id is treated as an implicit join.
    pub fn apply_update(&mut self, state: &PlayerState) -> ReconcileOutcome {
        self.upsert(state)
    }

    pub fn apply_left(&mut self, id: &PlayerId) -> ReconcileOutcome {
        match self.entities.remove(id) {
            Some(_) => ReconcileOutcome::Removed,
            None => ReconcileOutcome::Ignored,
        }
    }

    /// A full `player_list` for the local map.
    ///
    /// Entities missing from the roster are removed, every other entry is
    /// upserted. Returns the outcome for each id touched.
    pub fn apply_roster(&mut self, players: &[PlayerState]) -> Vec<(PlayerId, ReconcileOutcome)> {
        let absent: Vec<PlayerId> = self
            .entities
            .keys()
            .filter(|id| !players.iter().any(|p| p.id == **id))
            .copied()
            .collect();

        let mut outcomes = Vec::with_capacity(absent.len() + players.len());
        for id in absent {
            self.entities.remove(&id);
            outcomes.push((id, ReconcileOutcome::Removed));
        }
        for player in players {
            outcomes.push((player.id, self.upsert(player)));
        }
        outcomes
    }

    /// Moves every entity forward by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        let tick = self.config.tick.as_secs_f32();
        if tick <= 0.0 {
            return;
        }
        let steps = dt.as_secs_f32() / tick;
        if steps <= 0.0 {
            return;
        }

        let damping = self.config.damping.powf(steps);
        let rest = self.config.rest_epsilon;
        for entity in self.entities.values_mut() {
            step_axis(
                &mut entity.position.x,
                &mut entity.velocity.x,
                entity.target.x,
                steps,
                damping,
                rest,
            );
            step_axis(
                &mut entity.position.y,
                &mut entity.velocity.y,
                entity.target.y,
                steps,
                damping,
                rest,
            );
        }
    }

    pub fn get(&self, id: &PlayerId) -> Option<&RemoteEntity> {
        self.entities.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &RemoteEntity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Forgets every entity and the local identity, as after a reconnect.
    pub fn reset(&mut self) {
        self.entities.clear();
        self.local_id = None;
        self.local_map = None;
    }

    fn upsert(&mut self, state: &PlayerState) -> ReconcileOutcome {
        if Some(state.id) == self.local_id {
            return ReconcileOutcome::Ignored;
        }

        if let Some(map) = self.local_map {
            if state.map_id != map {
                return self.apply_left(&state.id);
            }
        }

        let target = Vector2::new(state.x, state.y);
        match self.entities.get_mut(&state.id) {
            Some(entity) => {
                entity.player = state.clone();
                steer(&self.config, entity, target)
            }
            None => {
                debug!("Spawning remote entity {} at ({}, {})", state.id, state.x, state.y);
                self.entities.insert(state.id, RemoteEntity::spawn(state));
                ReconcileOutcome::Spawned
            }
        }
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcilerConfig::default())
    }
}

fn steer(config: &ReconcilerConfig, entity: &mut RemoteEntity, target: Vector2) -> ReconcileOutcome {
    let gap = target.sub(&entity.position);
    entity.target = target;

    if gap.max_component() > config.teleport_threshold {
        entity.position = target;
        entity.velocity = Vector2::ZERO;
        return ReconcileOutcome::Snapped;
    }

    entity.velocity = gap.scale(config.gain).clamp_magnitude(config.max_speed);
    ReconcileOutcome::Smoothed
}

fn step_axis(position: &mut f32, velocity: &mut f32, target: f32, steps: f32, damping: f32, rest: f32) {
    if *velocity == 0.0 {
        return;
    }

    let remaining = target - *position;
    let travel = *velocity * steps;
    if remaining * travel <= 0.0 || travel.abs() >= remaining.abs() {
        *position = target;
        *velocity = 0.0;
        return;
    }

    *position += travel;
    *velocity *= damping;
    if velocity.abs() < rest {
        *velocity = 0.0;
    }
}
