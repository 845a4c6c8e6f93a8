use shared::{DEFAULT_HP, MAX_PAYLOAD_BYTES};
use std::time::Duration;

/// Minimum spacing between two throttled messages from one connection.
pub const INBOUND_SPACING: Duration = Duration::from_millis(50);
/// Minimum spacing between two `player_update` broadcasts for one connection.
pub const BROADCAST_INTERVAL: Duration = Duration::from_millis(100);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);
pub const INACTIVITY_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
/// How long a dead monster lingers in the cache before it is forgotten.
pub const MONSTER_REMOVAL_DELAY: Duration = Duration::from_secs(5);
/// A living monster nobody has hit for this long is dropped from the cache.
pub const MONSTER_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
pub const MAX_CONNECTIONS: usize = 256;

/// Tunables for the relay. `Default` carries the production values.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub max_connections: usize,
    pub inbound_spacing: Duration,
    pub broadcast_interval: Duration,
    pub heartbeat_interval: Duration,
    pub inactivity_timeout: Duration,
    pub inactivity_sweep_interval: Duration,
    pub monster_default_hp: u32,
    pub monster_removal_delay: Duration,
    pub monster_idle_timeout: Duration,
    pub max_payload_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_connections: MAX_CONNECTIONS,
            inbound_spacing: INBOUND_SPACING,
            broadcast_interval: BROADCAST_INTERVAL,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            inactivity_timeout: INACTIVITY_TIMEOUT,
            inactivity_sweep_interval: INACTIVITY_SWEEP_INTERVAL,
            monster_default_hp: DEFAULT_HP,
            monster_removal_delay: MONSTER_REMOVAL_DELAY,
            monster_idle_timeout: MONSTER_IDLE_TIMEOUT,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        }
    }
}

impl RelayConfig {
    /// How often the event loop runs its housekeeping sweep (pending
    /// broadcasts and monster reaping). Never slower than the broadcast pacing.
    pub fn sweep_interval(&self) -> Duration {
        self.broadcast_interval.max(Duration::from_millis(10))
    }
}
