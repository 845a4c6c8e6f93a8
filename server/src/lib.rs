//! # Presence Relay Server
//!
//! This library implements the relay that keeps players in the same map aware
//! of each other. It is deliberately not authoritative: clients simulate their
//! own characters and monsters, and the relay stores and forwards what they
//! report.
//!
//! ## Core Responsibilities
//!
//! ### Connection Registry
//! Tracks every accepted socket, the player state it has published, and the
//! liveness and pacing timestamps for it. A socket becomes visible to other
//! players only after it has sent `player_info`.
//!
//! ### Map-Scoped Broadcasting
//! Every event is fanned out to the connections whose player is in the same
//! map. Moving between maps runs a fixed sequence (leave, move, join, roster)
//! so no peer ever sees an arrival before the matching departure.
//!
//! ### Liveness and Rate Control
//! - Heartbeat pings evict sockets that stop answering
//! - Idle sockets are evicted after the inactivity timeout
//! - Inbound messages are spaced per connection
//! - Position broadcasts are paced per connection, with the last withheld
//!   update flushed once the window passes
//!
//! ### Monster Health
//! Damage reports from clients are folded into a shared hp cache and relayed
//! to the rest of the map.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! [`network::Server`] runs one `select!` loop that owns the [`relay::Relay`].
//! Reader tasks forward frames as events and writer tasks drain per-connection
//! queues, so relay state is only ever touched from one place.
//!
//! ### Testable Core
//! The relay never touches sockets directly. It writes to an
//! [`registry::Outbox`], which the network layer backs with a channel and tests
//! back with an in-memory journal.

pub mod config;
pub mod governor;
pub mod monsters;
pub mod network;
pub mod registry;
pub mod relay;
pub mod router;

#[cfg(test)]
mod testing;

pub use config::RelayConfig;
pub use network::Server;
pub use relay::Relay;
