//! Per-connection lifecycle.
//!
//! Each websocket moves through `Unbound -> Bound -> Closed`:
//! - `Unbound`: the session exists but no socket is attached.
//! - `Bound`: the socket is attached to its player slot; a writer task drains
//!   outbound frames and the read loop applies inbound proposals.
//! - `Closed`: terminal. Reached on a close frame, end of stream, a read
//!   error, or server shutdown. The slot is unbound on the way out.

use std::{fmt::Display, sync::Arc};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use submariner_shared::{game::PlayerSlot, net::decode_proposal};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    registry::{ConnectionId, FrameSender, GameRegistry, RegistryError},
    server::stopped,
    validation::StateValidator,
};

/// Frames buffered per connection before broadcast sends start failing.
pub const OUTBOUND_CAPACITY: usize = 32;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unbound,
    Bound,
    Closed,
}

/// One client's connection to its player slot.
pub struct Connection {
    slot: PlayerSlot,
    id: Option<ConnectionId>,
    state: ConnectionState,
    registry: GameRegistry,
    validator: Arc<dyn StateValidator>,
}

impl Connection {
    pub fn new(registry: GameRegistry, slot: PlayerSlot, validator: Arc<dyn StateValidator>) -> Self {
        Self {
            slot,
            id: None,
            state: ConnectionState::Unbound,
            registry,
            validator,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn slot(&self) -> PlayerSlot {
        self.slot
    }

    /// Attaches the outbound frame queue to the player slot.
    pub fn bind(&mut self, frames: FrameSender) -> Result<ConnectionId, RegistryError> {
        let id = self.registry.bind(self.slot, frames)?;
        self.id = Some(id);
        self.state = ConnectionState::Bound;
        Ok(id)
    }

    /// Read loop. Consumes inbound messages until the connection closes or
    /// `shutdown` fires, then unbinds the slot. Returns the final state.
    pub async fn run<S>(mut self, mut inbound: S, mut shutdown: watch::Receiver<bool>) -> ConnectionState
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        if self.state == ConnectionState::Bound {
            loop {
                let next = tokio::select! {
                    next = inbound.next() => next,
                    _ = stopped(&mut shutdown) => {
                        debug!(slot = self.slot.0, "Read loop interrupted by shutdown");
                        break;
                    }
                };
                match next {
                    Some(Ok(Message::Text(text))) => self.on_frame(text.as_bytes()),
                    Some(Ok(Message::Binary(data))) => self.on_frame(&data),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(slot = self.slot.0, "Client closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(slot = self.slot.0, error = %e, "Error while reading message from client");
                        break;
                    }
                }
            }
        }
        self.close();
        self.state
    }

    fn on_frame(&self, bytes: &[u8]) {
        let proposed = match decode_proposal(bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!(slot = self.slot.0, error = %e, "Improper JSON received");
                return;
            }
        };
        if let Err(e) = self
            .registry
            .validate_and_apply(self.slot, proposed, self.validator.as_ref())
        {
            warn!(slot = self.slot.0, error = %e, "Unable to validate client state");
        }
    }

    fn close(&mut self) {
        if let Some(id) = self.id.take() {
            self.registry.unbind(self.slot, id);
        }
        self.state = ConnectionState::Closed;
    }
}

/// Forwards queued frames to the socket until the queue closes or a write
/// fails, then closes the sink.
pub async fn run_writer<Si>(mut sink: Si, mut frames: mpsc::Receiver<String>, slot: PlayerSlot)
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    while let Some(frame) = frames.recv().await {
        if let Err(e) = sink.send(Message::Text(frame)).await {
            warn!(slot = slot.0, error = %e, "Error while sending state to client");
            return;
        }
    }
    let _ = sink.close().await;
}

/// Drives an upgraded socket: binds it, spawns its writer, runs its read loop.
pub async fn serve_socket(
    socket: WebSocket,
    registry: GameRegistry,
    slot: PlayerSlot,
    validator: Arc<dyn StateValidator>,
    shutdown: watch::Receiver<bool>,
) {
    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);

    let mut conn = Connection::new(registry, slot, validator);
    let id = match conn.bind(tx) {
        Ok(id) => id,
        Err(e) => {
            warn!(slot = slot.0, error = %e, "Could not bind connection");
            return;
        }
    };
    info!(slot = slot.0, connection = id.0, "Client connected");

    tokio::spawn(run_writer(sink, rx, slot));
    let state = conn.run(stream, shutdown).await;
    info!(slot = slot.0, connection = id.0, ?state, "Client disconnected");
}
