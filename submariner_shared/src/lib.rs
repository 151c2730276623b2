//! `submariner_shared`
//!
//! Libraries shared by the server and its tests.
//!
//! Design goals:
//! - Entity data lives in parallel, append-only component arrays behind
//!   per-entity presence masks.
//! - Component kinds form a closed enum; adding one is a compile-checked change.
//! - Game/session data types double as the JSON wire format.
//! - No `unsafe`.

pub mod component;
pub mod config;
pub mod ecs;
pub mod game;
pub mod math;
pub mod net;
pub mod systems;
pub mod tile;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::component::*;
    pub use crate::config::*;
    pub use crate::ecs::*;
    pub use crate::game::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::tile::*;
}
