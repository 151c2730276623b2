//! Server-authoritative arbitration of client proposals.

use submariner_shared::game::PlayerState;

/// Decides whether a client's proposed state replaces the authoritative one.
///
/// Implementations are pure: given the proposal and the current state they
/// return the state to store, or a rejection reason. The registry applies
/// the result atomically.
pub trait StateValidator: Send + Sync {
    fn validate(&self, proposed: &PlayerState, current: &PlayerState) -> Result<PlayerState, String>;
}

/// Accepts every proposal unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl StateValidator for AcceptAll {
    fn validate(&self, proposed: &PlayerState, _current: &PlayerState) -> Result<PlayerState, String> {
        Ok(*proposed)
    }
}
