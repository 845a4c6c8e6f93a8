//! Wire protocol shared by the presence relay and its clients.
//!
//! Every message travels as a JSON envelope `{"type": ..., "data": ...}` inside a
//! WebSocket text frame. Both directions are modelled as tagged enums so that a
//! handler matches on a closed set of variants instead of probing fields.

mod error;
mod ids;
mod protocol;
mod state;

pub use error::ProtocolError;
pub use ids::{MapId, PlayerId};
pub use protocol::{decode, encode, ClientMessage, ServerMessage};
pub use state::{ChatMessage, DamageEvent, MonsterId, MonsterState, PlayerState, PlayerUpdate, Stance};

/// Largest accepted message, in bytes. Enforced by the transport and the decoder.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

pub const DEFAULT_PORT: u16 = 3001;

pub const DEFAULT_HAIR: u32 = 30030;
pub const DEFAULT_FACE: u32 = 20000;
pub const DEFAULT_HP: u32 = 100;
