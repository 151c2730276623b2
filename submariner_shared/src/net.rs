//! Wire types.
//!
//! HTTP bodies for the game endpoints and the JSON frame codec used on the
//! websocket. Frames are plain JSON documents with no envelope: the server
//! sends a [`PlayerState`] frame followed by a [`GameState`] frame each tick,
//! and clients send [`PlayerState`] proposals.
//!
//! [`GameState`]: crate::game::GameState

use serde::{Deserialize, Serialize};

use crate::game::PlayerState;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "SessionID";

/// `POST /game/create` body. Carries no fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CreateGameRequest {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateGameResponse {
    pub gameid: usize,
}

/// `POST /game/join` body. Both fields are required.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinGameRequest {
    pub username: String,
    pub gameid: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinGameResponse {
    pub token: String,
}

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

/// Encodes one websocket frame.
pub fn encode_frame<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string(value)
}

/// Decodes a client's proposed state.
pub fn decode_proposal(b: &[u8]) -> serde_json::Result<PlayerState> {
    serde_json::from_slice(b)
}
