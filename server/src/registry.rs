//! Connection registry for the presence relay
//!
//! This module owns the server-side bookkeeping for every live socket:
//! - Connection lifecycle (accept, registration, removal)
//! - The single `PlayerState` each registered connection publishes
//! - Liveness and pacing timestamps consumed by the governor
//! - The outbound queue used to reach the connection's writer task
//!
//! A connection exists in the registry from the moment its socket is accepted,
//! but it only becomes visible to other players once it has sent `player_info`.

use log::{debug, info};
use shared::{MapId, PlayerId, PlayerState, PlayerUpdate};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

/// A frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("recipient queue is closed")]
    Closed,
}

/// Write half of a connection as seen by the relay.
///
/// The network layer backs this with an unbounded channel drained by a writer
/// task; tests substitute recording or failing implementations.
pub trait Outbox: Send {
    fn send(&self, frame: Outbound) -> Result<(), SendError>;

    fn is_open(&self) -> bool;
}

impl Outbox for mpsc::UnboundedSender<Outbound> {
    fn send(&self, frame: Outbound) -> Result<(), SendError> {
        mpsc::UnboundedSender::send(self, frame).map_err(|_| SendError::Closed)
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}

/// Represents one accepted socket and, once registered, its player
pub struct Connection {
    /// Identifier assigned on accept; doubles as the player id
    pub id: PlayerId,
    /// Peer address, when the transport knows it
    pub addr: Option<SocketAddr>,
    /// Cleared on every heartbeat ping, set again by the pong
    pub alive: bool,
    /// Last time any frame (including pongs) arrived
    pub last_seen: Instant,
    /// Last time a throttled message was admitted
    pub last_message: Option<Instant>,
    /// Last time this connection's position was broadcast
    pub last_broadcast: Option<Instant>,
    /// A paced update was withheld and still needs to go out
    pub pending_broadcast: bool,
    player: Option<PlayerState>,
    outbox: Box<dyn Outbox>,
}

impl Connection {
    pub fn new(id: PlayerId, addr: Option<SocketAddr>, outbox: Box<dyn Outbox>, now: Instant) -> Self {
        Self {
            id,
            addr,
            alive: true,
            last_seen: now,
            last_message: None,
            last_broadcast: None,
            pending_broadcast: false,
            player: None,
            outbox,
        }
    }

    pub fn player(&self) -> Option<&PlayerState> {
        self.player.as_ref()
    }

    pub fn is_registered(&self) -> bool {
        self.player.is_some()
    }

    pub fn map_id(&self) -> Option<MapId> {
        self.player.as_ref().map(|p| p.map_id)
    }

    pub fn is_open(&self) -> bool {
        self.outbox.is_open()
    }

    /// Queues a frame for the writer task. Fails without side effects when the
    /// socket is already gone.
    pub fn send(&self, frame: Outbound) -> Result<(), SendError> {
        if !self.outbox.is_open() {
            return Err(SendError::Closed);
        }
        self.outbox.send(frame)
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    pub fn is_inactive(&self, timeout: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

/// Result of storing a full `player_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoOutcome {
    /// First registration of this connection
    Registered,
    /// Re-sync without leaving the current map
    Resynced,
    /// Re-sync into another map; the caller must run the map transition
    MapChanged { from: MapId, to: MapId },
}

/// Result of merging a `player_update` delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Unknown or unregistered connection; nothing was stored
    Ignored,
    Merged,
    /// Fields were merged but the stored map id still names `from`
    MapChanged { from: MapId, to: MapId },
}

/// Owns every live connection and the player state published through it
///
/// The registry is plain data owned by the relay's event loop. It never
/// sends on its own; routing decisions live in [`crate::router`].
pub struct Registry {
    /// Connections indexed by their assigned id
    connections: HashMap<PlayerId, Connection>,
    /// Maximum number of concurrent sockets
    max_connections: usize,
}

impl Registry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            max_connections,
        }
    }

    /// Creates a bookkeeping entry with no player state.
    ///
    /// Returns false when the relay is at capacity or the id is already taken.
    pub fn register(
        &mut self,
        id: PlayerId,
        addr: Option<SocketAddr>,
        outbox: Box<dyn Outbox>,
        now: Instant,
    ) -> bool {
        if self.connections.len() >= self.max_connections || self.connections.contains_key(&id) {
            return false;
        }

        match addr {
            Some(addr) => info!("Connection {} accepted from {}", id, addr),
            None => info!("Connection {} accepted", id),
        }
        self.connections.insert(id, Connection::new(id, addr, outbox, now));
        true
    }

    /// Stores a full player state for a connection.
    ///
    /// The client-supplied id is replaced with the connection id. When the
    /// connection was already registered in another map, the previous map id is
    /// kept until the caller commits the transition with [`Registry::commit_map`].
    pub fn set_player_info(&mut self, id: &PlayerId, mut info: PlayerState) -> Option<InfoOutcome> {
        let connection = self.connections.get_mut(id)?;
        info.id = *id;

        let outcome = match connection.player.as_ref().map(|p| p.map_id) {
            None => InfoOutcome::Registered,
            Some(current) if current == info.map_id => InfoOutcome::Resynced,
            Some(current) => {
                let to = info.map_id;
                info.map_id = current;
                InfoOutcome::MapChanged { from: current, to }
            }
        };

        debug!("Player info for {} ({:?}) in map {}", id, info.name, info.map_id);
        connection.player = Some(info);
        Some(outcome)
    }

    /// Merges the fields present in `delta` into the connection's player.
    ///
    /// Updates from connections that have not registered are dropped.
    pub fn apply_update(&mut self, id: &PlayerId, delta: &PlayerUpdate) -> UpdateOutcome {
        let Some(player) = self.connections.get_mut(id).and_then(|c| c.player.as_mut()) else {
            return UpdateOutcome::Ignored;
        };

        player.apply_delta(delta);
        match delta.map_id {
            Some(to) if to != player.map_id => UpdateOutcome::MapChanged {
                from: player.map_id,
                to,
            },
            _ => UpdateOutcome::Merged,
        }
    }

    /// Moves a registered player into `map`. Returns false if there is no player.
    pub fn commit_map(&mut self, id: &PlayerId, map: MapId) -> bool {
        match self.connections.get_mut(id).and_then(|c| c.player.as_mut()) {
            Some(player) => {
                player.map_id = map;
                true
            }
            None => false,
        }
    }

    /// Deletes a connection and hands back its last known player state.
    ///
    /// `None` covers both an unknown id and a connection that never registered.
    pub fn remove(&mut self, id: &PlayerId) -> Option<PlayerState> {
        let connection = self.connections.remove(id)?;
        info!("Connection {} removed", id);
        connection.player
    }

    pub fn get(&self, id: &PlayerId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn player(&self, id: &PlayerId) -> Option<&PlayerState> {
        self.connections.get(id).and_then(|c| c.player.as_ref())
    }

    /// Registered connections currently in `map`
    pub fn in_map(&self, map: MapId) -> impl Iterator<Item = &Connection> {
        self.connections
            .values()
            .filter(move |c| c.map_id() == Some(map))
    }

    /// Snapshot of every registered player in `map`
    pub fn players_in_map(&self, map: MapId) -> Vec<PlayerState> {
        self.in_map(map).filter_map(|c| c.player.clone()).collect()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connections_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.connections.keys().copied().collect()
    }

    pub fn registered_count(&self) -> usize {
        self.connections.values().filter(|c| c.is_registered()).count()
    }

    /// Returns the number of live connections, registered or not
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Stance;

    fn channel_outbox() -> (Box<dyn Outbox>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Box::new(tx), rx)
    }

    fn registry_with(count: usize) -> (Registry, Vec<PlayerId>) {
        let mut registry = Registry::new(16);
        let now = Instant::now();
        let ids: Vec<PlayerId> = (0..count).map(|_| PlayerId::generate()).collect();
        for id in &ids {
            let (outbox, _rx) = channel_outbox();
            assert!(registry.register(*id, None, outbox, now));
        }
        (registry, ids)
    }

    #[test]
    fn test_register_creates_unregistered_entry() {
        let (registry, ids) = registry_with(1);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&ids[0]));
        assert!(registry.player(&ids[0]).is_none());
        assert_eq!(registry.registered_count(), 0);
    }

    #[test]
    fn test_register_enforces_capacity() {
        let mut registry = Registry::new(1);
        let now = Instant::now();

        let (first, _rx1) = channel_outbox();
        let (second, _rx2) = channel_outbox();
        assert!(registry.register(PlayerId::generate(), None, first, now));
        assert!(!registry.register(PlayerId::generate(), None, second, now));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_duplicate_id() {
        let (mut registry, ids) = registry_with(1);
        let (outbox, _rx) = channel_outbox();
        assert!(!registry.register(ids[0], None, outbox, Instant::now()));
    }

    #[test]
    fn test_set_player_info_overwrites_client_id() {
        let (mut registry, ids) = registry_with(1);
        let info = PlayerState::new(PlayerId::generate(), MapId::new(1));

        let outcome = registry.set_player_info(&ids[0], info);

        assert_eq!(outcome, Some(InfoOutcome::Registered));
        assert_eq!(registry.player(&ids[0]).unwrap().id, ids[0]);
    }

    #[test]
    fn test_set_player_info_unknown_connection() {
        let mut registry = Registry::new(4);
        let outcome = registry.set_player_info(&PlayerId::generate(), PlayerState::new(PlayerId::generate(), MapId::new(1)));
        assert_eq!(outcome, None);
    }

    #[test]
    fn test_resync_into_other_map_defers_commit() {
        let (mut registry, ids) = registry_with(1);
        registry.set_player_info(&ids[0], PlayerState::new(ids[0], MapId::new(1)));

        let outcome = registry.set_player_info(&ids[0], PlayerState::new(ids[0], MapId::new(2)));

        assert_eq!(
            outcome,
            Some(InfoOutcome::MapChanged {
                from: MapId::new(1),
                to: MapId::new(2)
            })
        );
        assert_eq!(registry.get(&ids[0]).unwrap().map_id(), Some(MapId::new(1)));

        assert!(registry.commit_map(&ids[0], MapId::new(2)));
        assert_eq!(registry.get(&ids[0]).unwrap().map_id(), Some(MapId::new(2)));
    }

    #[test]
    fn test_update_before_registration_is_ignored() {
        let (mut registry, ids) = registry_with(1);
        let delta = PlayerUpdate {
            x: Some(10.0),
            ..Default::default()
        };

        assert_eq!(registry.apply_update(&ids[0], &delta), UpdateOutcome::Ignored);
        assert!(registry.player(&ids[0]).is_none());
    }

    #[test]
    fn test_update_merges_and_detects_map_change() {
        let (mut registry, ids) = registry_with(1);
        registry.set_player_info(&ids[0], PlayerState::new(ids[0], MapId::new(1)));

        let same_map = PlayerUpdate {
            x: Some(42.0),
            stance: Some(Stance::Jump),
            map_id: Some(MapId::new(1)),
            ..Default::default()
        };
        assert_eq!(registry.apply_update(&ids[0], &same_map), UpdateOutcome::Merged);
        assert_eq!(registry.player(&ids[0]).unwrap().stance, Stance::Jump);

        let moving = PlayerUpdate {
            map_id: Some(MapId::new(5)),
            ..Default::default()
        };
        assert_eq!(
            registry.apply_update(&ids[0], &moving),
            UpdateOutcome::MapChanged {
                from: MapId::new(1),
                to: MapId::new(5)
            }
        );
    }

    #[test]
    fn test_players_in_map_skips_unregistered_and_other_maps() {
        let (mut registry, ids) = registry_with(4);
        registry.set_player_info(&ids[0], PlayerState::new(ids[0], MapId::new(1)));
        registry.set_player_info(&ids[1], PlayerState::new(ids[1], MapId::new(1)));
        registry.set_player_info(&ids[2], PlayerState::new(ids[2], MapId::new(2)));

        let mut in_map: Vec<PlayerId> = registry
            .players_in_map(MapId::new(1))
            .into_iter()
            .map(|p| p.id)
            .collect();
        in_map.sort();
        let mut expected = vec![ids[0], ids[1]];
        expected.sort();

        assert_eq!(in_map, expected);
    }

    #[test]
    fn test_remove_returns_last_state() {
        let (mut registry, ids) = registry_with(2);
        registry.set_player_info(&ids[0], PlayerState::new(ids[0], MapId::new(3)).at(1.0, 2.0));

        let removed = registry.remove(&ids[0]).unwrap();
        assert_eq!(removed.map_id, MapId::new(3));
        assert!(!registry.contains(&ids[0]));

        assert_eq!(registry.remove(&ids[1]), None, "never registered");
        assert_eq!(registry.remove(&ids[1]), None, "already gone");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_send_on_dropped_receiver_fails() {
        let mut registry = Registry::new(2);
        let id = PlayerId::generate();
        let (outbox, rx) = channel_outbox();
        registry.register(id, None, outbox, Instant::now());
        drop(rx);

        let connection = registry.get(&id).unwrap();
        assert!(!connection.is_open());
        assert_eq!(connection.send(Outbound::Ping), Err(SendError::Closed));
    }

    #[test]
    fn test_connection_inactivity() {
        let now = Instant::now();
        let (outbox, _rx) = channel_outbox();
        let mut connection = Connection::new(PlayerId::generate(), None, outbox, now);

        assert!(!connection.is_inactive(Duration::from_secs(60), now + Duration::from_secs(59)));
        assert!(connection.is_inactive(Duration::from_secs(60), now + Duration::from_secs(61)));

        connection.touch(now + Duration::from_secs(50));
        assert!(!connection.is_inactive(Duration::from_secs(60), now + Duration::from_secs(61)));
    }
}
