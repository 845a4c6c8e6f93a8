//! Liveness and rate governance for relay connections
//!
//! Three independent clocks are kept per connection:
//! - `alive`, cleared by every heartbeat ping and restored by the pong
//! - `last_message`, spacing admitted inbound messages
//! - `last_broadcast`, pacing outbound position broadcasts
//!
//! The governor only decides; the relay performs the resulting evictions and
//! broadcasts so all state changes stay on the event loop.

use crate::config::RelayConfig;
use crate::registry::{Connection, Outbound, Registry};
use log::{debug, warn};
use shared::PlayerId;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Governor {
    inbound_spacing: Duration,
    broadcast_interval: Duration,
    inactivity_timeout: Duration,
}

impl Governor {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            inbound_spacing: config.inbound_spacing,
            broadcast_interval: config.broadcast_interval,
            inactivity_timeout: config.inactivity_timeout,
        }
    }

    /// Inbound throttle. Admits a message if the previous admitted one is at
    /// least the minimum spacing old; a rejected message leaves no trace.
    pub fn admit(&self, connection: &mut Connection, now: Instant) -> bool {
        if let Some(last) = connection.last_message {
            if now.saturating_duration_since(last) < self.inbound_spacing {
                debug!("Throttled message from {}", connection.id);
                return false;
            }
        }
        connection.last_message = Some(now);
        true
    }

    /// Outbound pacing for position updates.
    ///
    /// Returns true when the caller may broadcast now. Otherwise the connection
    /// is marked as having a pending broadcast for the next sweep.
    pub fn claim_broadcast(&self, connection: &mut Connection, now: Instant) -> bool {
        if let Some(last) = connection.last_broadcast {
            if now.saturating_duration_since(last) < self.broadcast_interval {
                connection.pending_broadcast = true;
                return false;
            }
        }
        connection.last_broadcast = Some(now);
        connection.pending_broadcast = false;
        true
    }

    /// Connections whose withheld update may now go out.
    pub fn due_broadcasts(&self, registry: &Registry, now: Instant) -> Vec<PlayerId> {
        registry
            .connections()
            .filter(|c| c.pending_broadcast && c.is_registered())
            .filter(|c| match c.last_broadcast {
                Some(last) => now.saturating_duration_since(last) >= self.broadcast_interval,
                None => true,
            })
            .map(|c| c.id)
            .collect()
    }

    /// One heartbeat round.
    ///
    /// Connections that never answered the previous ping are returned for
    /// eviction. Every other connection is marked unanswered and pinged again.
    pub fn heartbeat(&self, registry: &mut Registry) -> Vec<PlayerId> {
        let mut dead = Vec::new();

        for connection in registry.connections_mut() {
            if !connection.alive {
                dead.push(connection.id);
                continue;
            }

            connection.alive = false;
            if let Err(e) = connection.send(Outbound::Ping) {
                warn!("Failed to ping {}: {}", connection.id, e);
                dead.push(connection.id);
            }
        }

        dead
    }

    pub fn record_pong(&self, connection: &mut Connection, now: Instant) {
        connection.alive = true;
        connection.touch(now);
    }

    /// Connections with no inbound traffic for longer than the inactivity timeout.
    pub fn inactive(&self, registry: &Registry, now: Instant) -> Vec<PlayerId> {
        registry
            .connections()
            .filter(|c| c.is_inactive(self.inactivity_timeout, now))
            .map(|c| c.id)
            .collect()
    }
}
