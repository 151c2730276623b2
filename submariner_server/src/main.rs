//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p submariner_server -- [--ip-address 0.0.0.0] [--port 8000]
//!       [--allowed-origin http://localhost:3000]... [--tick-ms 1000] [--config server.json]
//!
//! `--config` loads a JSON config first; flags given after it override its
//! fields. Repeating `--allowed-origin` builds the allow-list.

use std::env;

use anyhow::{bail, Context};
use submariner_server::GameServer;
use submariner_shared::config::ServerConfig;
use tracing::{error, info};

fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = env::args().collect();
    let mut cfg = ServerConfig::default();
    let mut origins: Vec<String> = Vec::new();
    let mut i = 1;
    while i < args.len() {
        let Some(value) = args.get(i + 1) else {
            bail!("missing value for {}", args[i]);
        };
        match args[i].as_str() {
            "--config" => {
                let raw = std::fs::read_to_string(value).with_context(|| format!("read config {value}"))?;
                cfg = ServerConfig::from_json_str(&raw).with_context(|| format!("parse config {value}"))?;
            }
            "--ip-address" => cfg.ip = value.clone(),
            "--port" => cfg.port = value.parse().with_context(|| format!("invalid port {value}"))?,
            "--allowed-origin" => origins.push(value.clone()),
            "--tick-ms" => cfg.tick_ms = value.parse().with_context(|| format!("invalid tick {value}"))?,
            other => bail!("unknown argument {other}"),
        }
        i += 2;
    }
    if !origins.is_empty() {
        cfg.allowed_origins = origins;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        ip = %cfg.ip,
        port = cfg.port,
        origins = ?cfg.allowed_origins,
        tick_ms = cfg.tick_ms,
        "Starting server"
    );

    let server = GameServer::bind(cfg).await.context("create server")?;
    let shutdown = server.shutdown_handle();
    let mut serving = tokio::spawn(server.serve());

    tokio::select! {
        res = &mut serving => {
            return res.context("server task")?;
        }
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!(error = %e, "Failed to listen for ctrl-c");
            }
            info!("Interrupt received");
        }
    }

    shutdown.shutdown();
    serving.await.context("server task")?
}
