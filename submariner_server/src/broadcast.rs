//! Periodic state push.
//!
//! Every tick, each bound player receives two frames: its own
//! `PlayerState`, then its game's `GameState`. Sends never block: a full or
//! closed queue fails that player for the rest of the tick and the loop moves
//! on. Ticks are best-effort snapshots with no ordering guarantee relative to
//! inbound proposals.

use std::time::Duration;

use tokio::{
    sync::watch,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{registry::GameRegistry, server::stopped};

/// Default broadcast period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Outcome of one broadcast tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Players that were queued both frames.
    pub delivered: usize,
    /// Players skipped because a send failed.
    pub skipped: usize,
}

/// Fixed-period driver pushing registry state to bound connections.
pub struct BroadcastLoop {
    registry: GameRegistry,
    period: Duration,
}

impl BroadcastLoop {
    pub fn new(registry: GameRegistry, period: Duration) -> Self {
        Self { registry, period }
    }

    /// Runs one broadcast tick.
    pub fn tick_once(&self) -> TickReport {
        let outbound = match self.registry.outbound_frames() {
            Ok(frames) => frames,
            Err(e) => {
                error!(error = %e, "Failed to serialize broadcast frames");
                return TickReport::default();
            }
        };

        let mut report = TickReport::default();
        for out in outbound {
            let sent = out
                .sender
                .try_send(out.player_frame)
                .and_then(|()| out.sender.try_send(out.game_frame));
            match sent {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        game = out.game.0,
                        slot = out.slot.0,
                        connection = out.connection.0,
                        error = %e,
                        "Error while sending state to client"
                    );
                    report.skipped += 1;
                }
            }
        }
        report
    }

    /// Ticks every period until `shutdown` fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(period = ?self.period, "Broadcast loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick_once();
                    debug!(delivered = report.delivered, skipped = report.skipped, "Broadcast tick");
                }
                _ = stopped(&mut shutdown) => break,
            }
        }
        info!("Broadcast loop stopped");
    }
}
