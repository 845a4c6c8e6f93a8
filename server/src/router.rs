//! Map-scoped fan-out of server messages.
//!
//! Every broadcast is scoped to one map partition. A message is serialized once
//! and queued to each recipient independently, so a dead recipient only costs a
//! log line.

use crate::registry::{Outbound, Registry};
use log::{debug, error, info, warn};
use shared::{MapId, PlayerId, ServerMessage};

fn encode(message: &ServerMessage) -> Option<String> {
    match shared::encode(message) {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to encode {} message: {}", message.kind(), e);
            None
        }
    }
}

/// Queues `message` for a single connection. Returns whether it was queued.
pub fn send_to(registry: &Registry, id: &PlayerId, message: &ServerMessage) -> bool {
    let Some(connection) = registry.get(id) else {
        return false;
    };
    let Some(text) = encode(message) else {
        return false;
    };

    match connection.send(Outbound::Text(text)) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to send {} to {}: {}", message.kind(), id, e);
            false
        }
    }
}

/// Sends `message` to every registered connection in `map` except `exclude`.
///
/// Recipients whose socket is already closed are skipped. Returns the number of
/// connections the message was queued for.
pub fn broadcast(
    registry: &Registry,
    map: MapId,
    message: &ServerMessage,
    exclude: Option<&PlayerId>,
) -> usize {
    let Some(text) = encode(message) else {
        return 0;
    };

    let mut delivered = 0;
    for connection in registry.in_map(map) {
        if Some(&connection.id) == exclude {
            continue;
        }
        if !connection.is_open() {
            debug!("Skipping closed connection {} in map {}", connection.id, map);
            continue;
        }

        match connection.send(Outbound::Text(text.clone())) {
            Ok(()) => delivered += 1,
            Err(e) => error!("Failed to broadcast {} to {}: {}", message.kind(), connection.id, e),
        }
    }

    debug!("Broadcast {} to {} connection(s) in map {}", message.kind(), delivered, map);
    delivered
}

/// Sends the requester every player in its own map, itself included.
pub fn send_full_roster(registry: &Registry, id: &PlayerId) -> bool {
    let Some(map) = registry.get(id).and_then(|c| c.map_id()) else {
        return false;
    };

    let players = registry.players_in_map(map);
    debug!("Sending roster of {} player(s) in map {} to {}", players.len(), map, id);
    send_to(registry, id, &ServerMessage::PlayerList(players))
}

/// Moves a registered player between partitions.
///
/// Order matters: the old map hears the departure before the stored map id
/// changes, the new map hears the arrival after, and the mover gets a roster
/// built from its new map last.
pub fn transition_map(registry: &mut Registry, id: &PlayerId, to: MapId) -> bool {
    let Some(from) = registry.get(id).and_then(|c| c.map_id()) else {
        return false;
    };
    if from == to {
        return false;
    }

    broadcast(registry, from, &ServerMessage::PlayerLeft(*id), Some(id));

    registry.commit_map(id, to);
    if let Some(connection) = registry.get_mut(id) {
        connection.pending_broadcast = false;
    }

    if let Some(player) = registry.player(id).cloned() {
        broadcast(registry, to, &ServerMessage::PlayerJoined(player), Some(id));
    }
    send_full_roster(registry, id);

    info!("Player {} moved from map {} to map {}", id, from, to);
    true
}
