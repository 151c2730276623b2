//! Server wiring.
//!
//! `GameServer` owns the listener, the shared registry and the shutdown
//! signal. `serve` runs the HTTP/websocket front end and the broadcast loop
//! side by side until shutdown, then closes every bound connection.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::Router;
use submariner_shared::config::ServerConfig;
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, warn};

use crate::{
    api::{build_router, AppState},
    broadcast::BroadcastLoop,
    registry::GameRegistry,
    validation::{AcceptAll, StateValidator},
};

/// Resolves once the shutdown flag is set or its sender is gone.
pub(crate) async fn stopped(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Cloneable trigger for a running server's shutdown.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

pub struct GameServer {
    cfg: ServerConfig,
    listener: TcpListener,
    state: AppState,
    shutdown: Arc<watch::Sender<bool>>,
}

impl GameServer {
    /// Binds the listener on `cfg.ip:cfg.port`.
    pub async fn bind(cfg: ServerConfig) -> anyhow::Result<Self> {
        let addr = cfg.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("bind {addr}"))?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let state = AppState {
            registry: GameRegistry::new(),
            config: Arc::new(cfg.clone()),
            validator: Arc::new(AcceptAll),
            shutdown: shutdown_rx,
        };
        Ok(Self {
            cfg,
            listener,
            state,
            shutdown: Arc::new(shutdown),
        })
    }

    /// Replaces the proposal validator.
    pub fn with_validator(mut self, validator: impl StateValidator + 'static) -> Self {
        self.state.validator = Arc::new(validator);
        self
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.cfg
    }

    pub fn registry(&self) -> GameRegistry {
        self.state.registry.clone()
    }

    /// Router sharing this server's registry and shutdown signal.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Serves until the shutdown handle fires.
    pub async fn serve(self) -> anyhow::Result<()> {
        let local = self.local_addr()?;
        let router = self.router();
        let registry = self.registry();

        let broadcast = BroadcastLoop::new(registry.clone(), self.cfg.tick_period());
        let broadcast = tokio::spawn(broadcast.run(self.shutdown.subscribe()));

        let mut shutdown_rx = self.shutdown.subscribe();
        let graceful = async move {
            stopped(&mut shutdown_rx).await;
            let closed = registry.close_all();
            info!(closed, "Shutting down; closed client connections");
        };

        info!(%local, "Server listening");
        let served = axum::serve(self.listener, router)
            .with_graceful_shutdown(graceful)
            .await
            .context("serve http");

        // Stop the broadcast loop even if the front end failed.
        self.shutdown.send_replace(true);
        if let Err(e) = broadcast.await {
            warn!(error = %e, "Broadcast task failed");
        }
        served?;
        info!("Server stopped");
        Ok(())
    }
}

/// Binds a server on an ephemeral localhost port.
pub async fn bind_ephemeral(tick_ms: u64) -> anyhow::Result<(GameServer, ServerConfig)> {
    let cfg = ServerConfig {
        ip: Ipv4Addr::LOCALHOST.to_string(),
        port: 0,
        tick_ms,
        ..Default::default()
    };
    let mut server = GameServer::bind(cfg).await?;
    server.cfg.port = server.local_addr()?.port();
    let cfg = server.cfg.clone();
    Ok((server, cfg))
}
