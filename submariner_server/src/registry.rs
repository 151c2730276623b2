//! Game/session registry.
//!
//! Owns every piece of mutable session state: games (mode + state pairs),
//! player state slots, the live connection bound to each slot, and the
//! session token map. All of it sits behind one coarse lock, taken inside
//! each public operation, so callers never hold or order locks themselves.
//! The lock is never held across an `.await`.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use submariner_shared::{
    game::{GameId, GameMode, GameState, PlayerSlot, PlayerState, SessionToken},
    net::encode_frame,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::validation::StateValidator;

/// Outbound frame queue feeding one socket's writer task.
pub type FrameSender = mpsc::Sender<String>;

/// Identifies one bound socket. A slot rebound by a reconnect gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Registry operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid GameID")]
    InvalidGameId(i64),
    #[error("Invalid Username")]
    InvalidUsername,
    #[error("Invalid session")]
    InvalidSession,
    #[error("player slot {0} does not exist")]
    InvalidSlot(usize),
    #[error("proposed state rejected: {0}")]
    Rejected(String),
}

/// Frames queued for one bound player during a broadcast tick.
#[derive(Debug)]
pub struct OutboundFrames {
    pub game: GameId,
    pub slot: PlayerSlot,
    pub connection: ConnectionId,
    pub sender: FrameSender,
    pub player_frame: String,
    pub game_frame: String,
}

struct ConnectionHandle {
    id: ConnectionId,
    frames: FrameSender,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, PlayerSlot>,
    /// `connections[i]` belongs to `player_states[i]`.
    connections: Vec<Option<ConnectionHandle>>,
    player_states: Vec<PlayerState>,
    /// `game_states[i]` belongs to `game_modes[i]`.
    game_states: Vec<GameState>,
    game_modes: Vec<GameMode>,
    next_connection: u64,
}

/// Shared handle to the session registry. Clones refer to the same state.
#[derive(Clone, Default)]
pub struct GameRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new game with no players.
    pub fn create_game(&self) -> GameId {
        let mut inner = self.inner.lock();
        inner.game_modes.push(GameMode::default());
        inner.game_states.push(GameState::default());
        let id = GameId(inner.game_modes.len() - 1);
        info!(game = id.0, "Game created");
        id
    }

    /// Adds a player to a game and mints its session token.
    ///
    /// On error nothing is allocated.
    pub fn join_game(&self, game_id: i64, username: &str) -> Result<SessionToken, RegistryError> {
        let mut inner = self.inner.lock();
        let game = usize::try_from(game_id)
            .ok()
            .filter(|&g| g < inner.game_modes.len())
            .ok_or(RegistryError::InvalidGameId(game_id))?;
        if username.is_empty() {
            return Err(RegistryError::InvalidUsername);
        }

        inner.player_states.push(PlayerState::default());
        inner.connections.push(None);
        let slot = PlayerSlot(inner.player_states.len() - 1);
        inner.game_modes[game].players.push(slot);

        let token = SessionToken::generate();
        inner.sessions.insert(token.as_str().to_owned(), slot);
        info!(game, slot = slot.0, %username, "Player joined");
        Ok(token)
    }

    /// Resolves a session token to its player slot.
    pub fn connect(&self, token: &str) -> Result<PlayerSlot, RegistryError> {
        self.inner
            .lock()
            .sessions
            .get(token)
            .copied()
            .ok_or(RegistryError::InvalidSession)
    }

    /// Attaches a live connection to `slot`, replacing any previous one, and
    /// resets the slot's state.
    pub fn bind(&self, slot: PlayerSlot, frames: FrameSender) -> Result<ConnectionId, RegistryError> {
        let mut inner = self.inner.lock();
        if slot.0 >= inner.connections.len() {
            return Err(RegistryError::InvalidSlot(slot.0));
        }
        inner.next_connection += 1;
        let id = ConnectionId(inner.next_connection);
        let replaced = inner.connections[slot.0]
            .replace(ConnectionHandle { id, frames })
            .is_some();
        inner.player_states[slot.0] = PlayerState::default();
        info!(slot = slot.0, connection = id.0, replaced, "Connection bound");
        Ok(id)
    }

    /// Detaches `connection` from `slot`. Returns `false` when the slot is
    /// already unbound or bound to a different connection.
    pub fn unbind(&self, slot: PlayerSlot, connection: ConnectionId) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.connections.get_mut(slot.0) else {
            return false;
        };
        if entry.as_ref().is_some_and(|h| h.id == connection) {
            *entry = None;
            info!(slot = slot.0, connection = connection.0, "Connection unbound");
            true
        } else {
            debug!(slot = slot.0, connection = connection.0, "Stale unbind ignored");
            false
        }
    }

    /// Drops every live connection handle. Returns how many were bound.
    pub fn close_all(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut closed = 0;
        for entry in inner.connections.iter_mut() {
            if entry.take().is_some() {
                closed += 1;
            }
        }
        info!(closed, "Closed all connections");
        closed
    }

    /// Runs `proposed` through `validator` and, if accepted, replaces the
    /// slot's state. The read, check, and write happen under one lock.
    pub fn validate_and_apply(
        &self,
        slot: PlayerSlot,
        proposed: PlayerState,
        validator: &dyn StateValidator,
    ) -> Result<PlayerState, RegistryError> {
        let mut inner = self.inner.lock();
        let current = inner
            .player_states
            .get_mut(slot.0)
            .ok_or(RegistryError::InvalidSlot(slot.0))?;
        let accepted = validator
            .validate(&proposed, current)
            .map_err(RegistryError::Rejected)?;
        *current = accepted;
        Ok(accepted)
    }

    /// Serializes this tick's frames for every bound player of every game.
    pub fn outbound_frames(&self) -> serde_json::Result<Vec<OutboundFrames>> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        for (index, mode) in inner.game_modes.iter().enumerate() {
            let bound: Vec<(PlayerSlot, &ConnectionHandle)> = mode
                .players
                .iter()
                .filter_map(|&slot| Some((slot, inner.connections.get(slot.0)?.as_ref()?)))
                .collect();
            if bound.is_empty() {
                continue;
            }
            let game_frame = encode_frame(&inner.game_states[index])?;
            for (slot, handle) in bound {
                out.push(OutboundFrames {
                    game: GameId(index),
                    slot,
                    connection: handle.id,
                    sender: handle.frames.clone(),
                    player_frame: encode_frame(&inner.player_states[slot.0])?,
                    game_frame: game_frame.clone(),
                });
            }
        }
        Ok(out)
    }

    pub fn player_state(&self, slot: PlayerSlot) -> Option<PlayerState> {
        self.inner.lock().player_states.get(slot.0).copied()
    }

    pub fn game_mode(&self, game: GameId) -> Option<GameMode> {
        self.inner.lock().game_modes.get(game.0).cloned()
    }

    pub fn is_bound(&self, slot: PlayerSlot) -> bool {
        self.inner
            .lock()
            .connections
            .get(slot.0)
            .is_some_and(Option::is_some)
    }

    pub fn game_count(&self) -> usize {
        self.inner.lock().game_modes.len()
    }

    pub fn player_count(&self) -> usize {
        self.inner.lock().player_states.len()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use submariner_shared::game::PlayerCondition;

    use super::*;
    use crate::validation::AcceptAll;

    struct RejectAll;

    impl StateValidator for RejectAll {
        fn validate(&self, _proposed: &PlayerState, _current: &PlayerState) -> Result<PlayerState, String> {
            Err("frozen".into())
        }
    }

    fn moved(x: i32, y: i32) -> PlayerState {
        PlayerState {
            x,
            y,
            condition: PlayerCondition::Alive,
        }
    }

    #[test]
    fn create_game_ids_are_sequential_and_empty() {
        let reg = GameRegistry::new();
        for n in 0..4 {
            assert_eq!(reg.create_game(), GameId(n));
        }
        for n in 0..4 {
            assert_eq!(reg.game_mode(GameId(n)), Some(GameMode::default()));
        }
        assert_eq!(reg.game_count(), 4);
    }

    #[test]
    fn join_rejects_out_of_range_game_without_side_effects() {
        let reg = GameRegistry::new();
        assert_eq!(reg.join_game(0, "bob"), Err(RegistryError::InvalidGameId(0)));
        reg.create_game();
        assert_eq!(reg.join_game(1, "bob"), Err(RegistryError::InvalidGameId(1)));
        assert_eq!(reg.join_game(-1, "bob"), Err(RegistryError::InvalidGameId(-1)));
        assert_eq!(reg.player_count(), 0);
        assert_eq!(reg.session_count(), 0);
        assert!(reg.game_mode(GameId(0)).unwrap().players.is_empty());
    }

    #[test]
    fn join_rejects_empty_username() {
        let reg = GameRegistry::new();
        reg.create_game();
        assert_eq!(reg.join_game(0, ""), Err(RegistryError::InvalidUsername));
        assert_eq!(reg.player_count(), 0);
    }

    #[test]
    fn joins_mint_distinct_tokens_and_increasing_slots() {
        let reg = GameRegistry::new();
        let game = reg.create_game();
        let a = reg.join_game(0, "bob").unwrap();
        let b = reg.join_game(0, "alice").unwrap();
        assert_ne!(a, b);

        let slot_a = reg.connect(a.as_str()).unwrap();
        let slot_b = reg.connect(b.as_str()).unwrap();
        assert!(slot_a < slot_b);
        assert_eq!(reg.game_mode(game).unwrap().players, vec![slot_a, slot_b]);
        assert_eq!(reg.player_state(slot_b), Some(PlayerState::default()));
        assert!(!reg.is_bound(slot_a));
    }

    #[test]
    fn connect_with_unknown_token_fails() {
        let reg = GameRegistry::new();
        assert_eq!(reg.connect("nope"), Err(RegistryError::InvalidSession));
    }

    #[test]
    fn bind_resets_state_and_stale_unbind_is_ignored() {
        let reg = GameRegistry::new();
        reg.create_game();
        let token = reg.join_game(0, "bob").unwrap();
        let slot = reg.connect(token.as_str()).unwrap();

        let (tx, _rx) = mpsc::channel(4);
        let first = reg.bind(slot, tx).unwrap();
        reg.validate_and_apply(slot, moved(4, 4), &AcceptAll).unwrap();

        let (tx, _rx2) = mpsc::channel(4);
        let second = reg.bind(slot, tx).unwrap();
        assert_ne!(first, second);
        assert_eq!(reg.player_state(slot), Some(PlayerState::default()));

        assert!(!reg.unbind(slot, first));
        assert!(reg.is_bound(slot));
        assert!(reg.unbind(slot, second));
        assert!(!reg.is_bound(slot));
    }

    #[test]
    fn bind_unknown_slot_fails() {
        let reg = GameRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        assert_eq!(reg.bind(PlayerSlot(0), tx), Err(RegistryError::InvalidSlot(0)));
    }

    #[test]
    fn rejected_proposal_leaves_state_untouched() {
        let reg = GameRegistry::new();
        reg.create_game();
        let slot = reg
            .connect(reg.join_game(0, "bob").unwrap().as_str())
            .unwrap();

        let applied = reg.validate_and_apply(slot, moved(1, 2), &AcceptAll).unwrap();
        assert_eq!(applied, moved(1, 2));

        let err = reg.validate_and_apply(slot, moved(9, 9), &RejectAll).unwrap_err();
        assert_eq!(err, RegistryError::Rejected("frozen".into()));
        assert_eq!(reg.player_state(slot), Some(moved(1, 2)));
    }

    #[test]
    fn outbound_frames_cover_only_bound_players() {
        let reg = GameRegistry::new();
        reg.create_game();
        reg.create_game();
        let a = reg.connect(reg.join_game(0, "a").unwrap().as_str()).unwrap();
        let _b = reg.connect(reg.join_game(0, "b").unwrap().as_str()).unwrap();
        let c = reg.connect(reg.join_game(1, "c").unwrap().as_str()).unwrap();

        let (tx_a, _rx_a) = mpsc::channel(4);
        let (tx_c, _rx_c) = mpsc::channel(4);
        reg.bind(a, tx_a).unwrap();
        reg.bind(c, tx_c).unwrap();
        reg.validate_and_apply(c, moved(7, 8), &AcceptAll).unwrap();

        let frames = reg.outbound_frames().unwrap();
        let slots: Vec<_> = frames.iter().map(|f| (f.game, f.slot)).collect();
        assert_eq!(slots, vec![(GameId(0), a), (GameId(1), c)]);
        assert_eq!(frames[0].player_frame, r#"{"x":0,"y":0,"condition":0}"#);
        assert_eq!(frames[1].player_frame, r#"{"x":7,"y":8,"condition":1}"#);
        assert!(frames.iter().all(|f| f.game_frame == "{}"));
    }

    #[test]
    fn close_all_unbinds_everything() {
        let reg = GameRegistry::new();
        reg.create_game();
        let a = reg.connect(reg.join_game(0, "a").unwrap().as_str()).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        reg.bind(a, tx).unwrap();

        assert_eq!(reg.close_all(), 1);
        assert!(!reg.is_bound(a));
        assert!(rx.try_recv().is_err());
        assert!(reg.outbound_frames().unwrap().is_empty());
    }
}
