//! `submariner_server`
//!
//! Server-side pieces:
//! - Game/session registry shared by every handler
//! - HTTP endpoints for creating and joining games
//! - One websocket per player, bound to its slot
//! - Fixed-period broadcast of player and game state
//!
//! Clients propose their own state over the websocket; a `StateValidator`
//! decides what the server stores.

pub mod api;
pub mod broadcast;
pub mod connection;
pub mod error;
pub mod registry;
pub mod server;
pub mod validation;

pub use registry::GameRegistry;
pub use server::{bind_ephemeral, GameServer, ShutdownHandle};
