//! Game session data model.
//!
//! A game is a [`GameMode`]/[`GameState`] pair sharing one [`GameId`]. Each
//! joined player owns one [`PlayerState`] slot, addressed by [`PlayerSlot`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a game (its mode and state share the index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub usize);

/// Index of a joined player's state slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerSlot(pub usize);

/// Player life condition. Encoded on the wire as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PlayerCondition {
    /// Fresh slot; the player has not been placed yet.
    #[default]
    Unset = 0,
    Alive = 1,
    Down = 2,
    Dead = 4,
}

impl From<PlayerCondition> for u8 {
    fn from(c: PlayerCondition) -> u8 {
        c as u8
    }
}

impl TryFrom<u8> for PlayerCondition {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(PlayerCondition::Unset),
            1 => Ok(PlayerCondition::Alive),
            2 => Ok(PlayerCondition::Down),
            4 => Ok(PlayerCondition::Dead),
            other => Err(format!("unknown player condition {other}")),
        }
    }
}

/// Authoritative per-player state. Every field is required on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerState {
    pub x: i32,
    pub y: i32,
    pub condition: PlayerCondition,
}

/// Game-wide state shared by every player of a game.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameState {}

/// Per-game session metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameMode {
    /// Player slots in join order.
    pub players: Vec<PlayerSlot>,
}

/// Opaque per-player session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Mints a fresh random (UUID v4) token.
    pub fn generate() -> Self {
        SessionToken(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
