//! Relay-side monster health cache.
//!
//! Clients own monster simulation; the relay only folds reported damage into a
//! shared hp figure so every client in the map converges on the same number.
//! Reports are applied in arrival order with no deduplication.

use log::{debug, info};
use shared::{DamageEvent, MapId, MonsterId, MonsterState};
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct CachedMonster {
    state: MonsterState,
    last_update: Instant,
    /// Set once, when hp first reaches zero
    dead_since: Option<Instant>,
}

/// Monsters are keyed per map since spawn ids are only unique within a map.
pub struct MonsterCache {
    monsters: HashMap<(MapId, MonsterId), CachedMonster>,
    default_hp: u32,
    removal_delay: Duration,
    idle_timeout: Duration,
}

impl MonsterCache {
    pub fn new(default_hp: u32, removal_delay: Duration, idle_timeout: Duration) -> Self {
        Self {
            monsters: HashMap::new(),
            default_hp,
            removal_delay,
            idle_timeout,
        }
    }

    /// Folds one damage report into the cache and returns the resulting state.
    ///
    /// An unknown monster is created with the reporter's `max_hp` hint, or the
    /// default hp when there is none. A hint on a known monster overwrites its
    /// maximum and clamps the current hp to it.
    pub fn apply_damage(&mut self, event: &DamageEvent, map: MapId, now: Instant) -> MonsterState {
        let default_hp = self.default_hp;
        let entry = self
            .monsters
            .entry((map, event.target_id))
            .or_insert_with(|| {
                let max_hp = event.max_hp.unwrap_or(default_hp);
                debug!("Tracking monster {} in map {} with {} hp", event.target_id, map, max_hp);
                CachedMonster {
                    state: MonsterState {
                        id: event.target_id,
                        hp: max_hp,
                        max_hp,
                        map_id: map,
                    },
                    last_update: now,
                    dead_since: None,
                }
            });

        if let Some(max_hp) = event.max_hp {
            if entry.dead_since.is_none() && max_hp != entry.state.max_hp {
                entry.state.max_hp = max_hp;
                entry.state.hp = entry.state.hp.min(max_hp);
            }
        }

        entry.state.hp = entry.state.hp.saturating_sub(event.damage);
        entry.last_update = now;

        if entry.state.hp == 0 && entry.dead_since.is_none() {
            info!("Monster {} in map {} died", event.target_id, map);
            entry.dead_since = Some(now);
        }

        entry.state.clone()
    }

    /// Forgets monsters that have been dead for at least the removal delay,
    /// and living ones that have not been hit within the idle timeout.
    pub fn reap(&mut self, now: Instant) -> usize {
        let delay = self.removal_delay;
        let idle = self.idle_timeout;
        let before = self.monsters.len();
        self.monsters.retain(|_, monster| match monster.dead_since {
            Some(died) => now.saturating_duration_since(died) < delay,
            None => now.saturating_duration_since(monster.last_update) < idle,
        });

        let reaped = before - self.monsters.len();
        if reaped > 0 {
            debug!("Reaped {} monster(s)", reaped);
        }
        reaped
    }

    /// Forgets every monster in a map for which `occupied` returns false.
    pub fn reap_abandoned<F>(&mut self, occupied: F) -> usize
    where
        F: Fn(MapId) -> bool,
    {
        let before = self.monsters.len();
        self.monsters.retain(|(map, _), _| occupied(*map));

        let reaped = before - self.monsters.len();
        if reaped > 0 {
            debug!("Dropped {} monster(s) from empty maps", reaped);
        }
        reaped
    }

    pub fn get(&self, map: MapId, id: MonsterId) -> Option<&MonsterState> {
        self.monsters.get(&(map, id)).map(|m| &m.state)
    }

    /// When the monster last took damage
    pub fn last_update(&self, map: MapId, id: MonsterId) -> Option<Instant> {
        self.monsters.get(&(map, id)).map(|m| m.last_update)
    }

    pub fn len(&self) -> usize {
        self.monsters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monsters.is_empty()
    }
}
