//! # Presence Relay Client Library
//!
//! Client side of the presence relay: keeps a connection to the relay alive,
//! publishes the local player's state when it changes, and turns the sparse
//! updates it receives into smooth motion for everybody else in the map.
//!
//! Rendering, input, and local physics are left to the embedding game. It
//! supplies the local player through [`avatar::LocalAvatar`] and reads remote
//! players from [`reconciler::Reconciler`].
//!
//! ## Module Organization
//!
//! ### Reconciler (`reconciler`)
//! Mirrors of remote players:
//! - Snap on large jumps, glide toward small corrections
//! - Velocity capped and damped per tick, never overshooting
//! - Map filtering and roster reconciliation
//!
//! ### Session (`session`)
//! Socket-free protocol logic:
//! - Handshake (`player_id` → `player_info` → `get_player_list`)
//! - Change-gated outbound updates
//! - Chat and monster damage reports once registered
//!
//! ### Network (`network`)
//! The async driver that owns the WebSocket, ticks the session and reconciler,
//! and reconnects with a bounded budget before giving up.
//!
//! ### Avatar (`avatar`)
//! The [`avatar::LocalAvatar`] seam plus a headless wandering implementation.

pub mod avatar;
pub mod network;
pub mod reconciler;
pub mod reconnect;
pub mod session;
pub mod vector;

pub use network::{Client, ClientCommand, ClientConfig, SessionError, SessionState};
pub use reconciler::{ReconcileOutcome, Reconciler, ReconcilerConfig, RemoteEntity};
pub use session::{SessionCore, SessionEvent};
