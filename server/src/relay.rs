//! Message handling for the presence relay
//!
//! `Relay` owns all shared state (registry, monster cache, governor) and is
//! driven exclusively by the network event loop. Every method runs to
//! completion before the next event is looked at, so no locking is needed.
//!
//! Connection lifecycle as seen here:
//! - `connect` on accept, which replies with the assigned `player_id`
//! - `handle_frame` for every text frame, in arrival order
//! - `handle_pong` for heartbeat answers
//! - `disconnect` on close, or `evict` when the relay drops the socket itself

use crate::config::RelayConfig;
use crate::governor::Governor;
use crate::monsters::MonsterCache;
use crate::registry::{InfoOutcome, Outbound, Outbox, Registry, UpdateOutcome};
use crate::router;
use log::{debug, info, warn};
use shared::{
    ChatMessage, ClientMessage, DamageEvent, PlayerId, PlayerState, PlayerUpdate, ProtocolError,
    ServerMessage,
};
use std::net::SocketAddr;
use std::time::Instant;

pub const SERVER_FULL: &str = "Server full";

pub struct Relay {
    config: RelayConfig,
    registry: Registry,
    monsters: MonsterCache,
    governor: Governor,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            registry: Registry::new(config.max_connections),
            monsters: MonsterCache::new(
                config.monster_default_hp,
                config.monster_removal_delay,
                config.monster_idle_timeout,
            ),
            governor: Governor::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn monsters(&self) -> &MonsterCache {
        &self.monsters
    }

    /// Admits a freshly accepted socket and tells it its id.
    ///
    /// At capacity the socket is told the server is full and closed; it never
    /// gets a registry entry.
    pub fn connect(
        &mut self,
        id: PlayerId,
        addr: Option<SocketAddr>,
        outbox: Box<dyn Outbox>,
        now: Instant,
    ) -> bool {
        if self.registry.len() >= self.config.max_connections {
            warn!(
                "Rejecting connection {}: {} connections already open",
                id,
                self.registry.len()
            );
            if let Ok(text) = shared::encode(&ServerMessage::Error(SERVER_FULL.to_string())) {
                let _ = outbox.send(Outbound::Text(text));
            }
            let _ = outbox.send(Outbound::Close(SERVER_FULL.to_string()));
            return false;
        }

        if !self.registry.register(id, addr, outbox, now) {
            warn!("Connection id {} is already in use", id);
            return false;
        }

        router::send_to(&self.registry, &id, &ServerMessage::PlayerId(id));
        true
    }

    /// Handles one text frame from a connection.
    pub fn handle_frame(&mut self, id: &PlayerId, text: &str, now: Instant) {
        let Some(connection) = self.registry.get_mut(id) else {
            return;
        };
        connection.touch(now);

        let message = match shared::decode::<ClientMessage>(text) {
            Ok(message) => message,
            Err(ProtocolError::Empty) => return,
            Err(e) => {
                warn!("Bad message from {}: {}", id, e);
                self.reply_error(id, &e.to_string());
                return;
            }
        };

        if !message.is_handshake() && !self.changes_map(id, &message) {
            let Some(connection) = self.registry.get_mut(id) else {
                return;
            };
            if !self.governor.admit(connection, now) {
                return;
            }
        }

        debug!("Received {} from {}", message.kind(), id);
        match message {
            ClientMessage::PlayerInfo(info) => self.on_player_info(id, info),
            ClientMessage::PlayerUpdate(delta) => self.on_player_update(id, &delta, now),
            ClientMessage::GetPlayerList => {
                router::send_full_roster(&self.registry, id);
            }
            ClientMessage::ChatMessage(chat) => self.on_chat(id, chat),
            ClientMessage::MonsterDamage(event) => self.on_monster_damage(id, event, now),
        }
    }

    /// A frame the transport could not turn into text.
    pub fn handle_invalid(&mut self, id: &PlayerId, reason: &str, now: Instant) {
        let Some(connection) = self.registry.get_mut(id) else {
            return;
        };
        connection.touch(now);
        warn!("Unreadable frame from {}: {}", id, reason);
        self.reply_error(id, reason);
    }

    pub fn handle_pong(&mut self, id: &PlayerId, now: Instant) {
        if let Some(connection) = self.registry.get_mut(id) {
            self.governor.record_pong(connection, now);
        }
    }

    /// Removes a connection and tells its map it left. Safe to call twice.
    pub fn disconnect(&mut self, id: &PlayerId) -> Option<PlayerState> {
        let player = self.registry.remove(id)?;
        router::broadcast(
            &self.registry,
            player.map_id,
            &ServerMessage::PlayerLeft(*id),
            Some(id),
        );
        info!("Player {} ({}) left map {}", id, player.name, player.map_id);
        Some(player)
    }

    /// Closes a connection from the relay side and runs the disconnect path.
    pub fn evict(&mut self, id: &PlayerId, reason: &str) -> Option<PlayerState> {
        if let Some(connection) = self.registry.get(id) {
            info!("Evicting {}: {}", id, reason);
            let _ = connection.send(Outbound::Close(reason.to_string()));
        }
        self.disconnect(id)
    }

    /// Pings every connection, evicting those that ignored the previous ping.
    pub fn heartbeat(&mut self) -> usize {
        let dead = self.governor.heartbeat(&mut self.registry);
        for id in &dead {
            self.evict(id, "Heartbeat timeout");
        }
        dead.len()
    }

    pub fn sweep_inactive(&mut self, now: Instant) -> usize {
        let inactive = self.governor.inactive(&self.registry, now);
        for id in &inactive {
            self.evict(id, "Inactive");
        }
        inactive.len()
    }

    /// Flushes withheld position updates whose pacing window has passed and
    /// forgets monsters that are dead, idle, or in a map nobody is in.
    pub fn sweep(&mut self, now: Instant) {
        for id in self.governor.due_broadcasts(&self.registry, now) {
            self.broadcast_position(&id, now);
        }
        self.monsters.reap(now);
        let registry = &self.registry;
        self.monsters
            .reap_abandoned(|map| registry.in_map(map).next().is_some());
    }

    /// Closes every connection, used on shutdown.
    pub fn close_all(&mut self, reason: &str) {
        for id in self.registry.ids() {
            self.evict(&id, reason);
        }
    }

    /// A `player_update` that moves a registered player to another map. These
    /// bypass the inbound throttle: the client will not repeat a map change it
    /// has already sent.
    fn changes_map(&self, id: &PlayerId, message: &ClientMessage) -> bool {
        let ClientMessage::PlayerUpdate(delta) = message else {
            return false;
        };
        match (delta.map_id, self.registry.get(id).and_then(|c| c.map_id())) {
            (Some(to), Some(current)) => to != current,
            _ => false,
        }
    }

    fn reply_error(&self, id: &PlayerId, reason: &str) {
        let message = ServerMessage::Error(format!("Failed to process message: {}", reason));
        router::send_to(&self.registry, id, &message);
    }

    fn on_player_info(&mut self, id: &PlayerId, info: PlayerState) {
        match self.registry.set_player_info(id, info) {
            None => {}
            Some(InfoOutcome::MapChanged { to, .. }) => {
                router::transition_map(&mut self.registry, id, to);
            }
            Some(outcome) => {
                let Some(player) = self.registry.player(id).cloned() else {
                    return;
                };
                if outcome == InfoOutcome::Registered {
                    info!("Player {} ({}) registered in map {}", id, player.name, player.map_id);
                } else {
                    debug!("Player {} re-synced in map {}", id, player.map_id);
                }

                let map = player.map_id;
                router::broadcast(&self.registry, map, &ServerMessage::PlayerJoined(player), Some(id));
                router::send_full_roster(&self.registry, id);
            }
        }
    }

    fn on_player_update(&mut self, id: &PlayerId, delta: &PlayerUpdate, now: Instant) {
        match self.registry.apply_update(id, delta) {
            UpdateOutcome::Ignored => debug!("Ignoring update from unregistered {}", id),
            UpdateOutcome::Merged => self.broadcast_position(id, now),
            UpdateOutcome::MapChanged { to, .. } => {
                router::transition_map(&mut self.registry, id, to);
            }
        }
    }

    fn broadcast_position(&mut self, id: &PlayerId, now: Instant) {
        let Some(connection) = self.registry.get_mut(id) else {
            return;
        };
        if !self.governor.claim_broadcast(connection, now) {
            return;
        }

        if let Some(player) = self.registry.player(id).cloned() {
            let map = player.map_id;
            router::broadcast(&self.registry, map, &ServerMessage::PlayerUpdate(player), Some(id));
        }
    }

    fn on_chat(&mut self, id: &PlayerId, chat: ChatMessage) {
        let Some(map) = self.registry.get(id).and_then(|c| c.map_id()) else {
            debug!("Ignoring chat from unregistered {}", id);
            return;
        };
        if chat.map_id != map {
            debug!("Chat from {} named map {} but sender is in {}", id, chat.map_id, map);
        }

        let chat = ChatMessage {
            player_id: *id,
            message: chat.message,
            map_id: map,
        };
        router::broadcast(&self.registry, map, &ServerMessage::ChatMessage(chat), None);
    }

    fn on_monster_damage(&mut self, id: &PlayerId, event: DamageEvent, now: Instant) {
        let Some(map) = self.registry.get(id).and_then(|c| c.map_id()) else {
            debug!("Ignoring damage from unregistered {}", id);
            return;
        };

        let event = DamageEvent {
            source_id: *id,
            map_id: map,
            ..event
        };
        let monster = self.monsters.apply_damage(&event, map, now);

        router::broadcast(&self.registry, map, &ServerMessage::MonsterDamage(event), Some(id));
        router::broadcast(&self.registry, map, &ServerMessage::MonsterUpdate(monster), None);
    }
}
