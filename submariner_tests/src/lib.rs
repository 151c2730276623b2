//! Helpers for driving a live server from integration tests.
//!
//! HTTP calls go straight through the server's router; websockets connect
//! over a real socket so the handshake, origin and cookie checks run as
//! they would for a browser.

use std::{net::SocketAddr, time::Duration};

use anyhow::{anyhow, bail, Context};
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    Router,
};
use futures_util::StreamExt;
use serde_json::Value;
use submariner_server::{bind_ephemeral, GameRegistry, ShutdownHandle};
use tokio::{net::TcpStream, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};
use tower::ServiceExt;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Origin the default config allows.
pub const ALLOWED_ORIGIN: &str = "http://localhost:3000";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: GameRegistry,
    router: Router,
    shutdown: ShutdownHandle,
    task: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start(tick_ms: u64) -> anyhow::Result<Self> {
        init_tracing();
        let (server, _cfg) = bind_ephemeral(tick_ms).await?;
        let addr = server.local_addr()?;
        let registry = server.registry();
        let router = server.router();
        let shutdown = server.shutdown_handle();
        let task = tokio::spawn(server.serve());
        Ok(Self {
            addr,
            registry,
            router,
            shutdown,
            task,
        })
    }

    /// POSTs `body` to `uri`. Returns status, headers and the JSON body.
    pub async fn post_json(&self, uri: &str, body: &str) -> anyhow::Result<(StatusCode, HeaderMap, Value)> {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ORIGIN, ALLOWED_ORIGIN)
            .body(Body::from(body.to_owned()))?;
        let res = self.router.clone().oneshot(req).await?;
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX).await?;
        let json = serde_json::from_slice(&bytes).with_context(|| format!("decode {uri} response"))?;
        Ok((status, headers, json))
    }

    pub async fn create_game(&self) -> anyhow::Result<i64> {
        let (status, _, body) = self.post_json("/game/create", "{}").await?;
        if status != StatusCode::OK {
            bail!("create failed: {status} {body}");
        }
        body["gameid"].as_i64().ok_or_else(|| anyhow!("no gameid in {body}"))
    }

    /// Joins `game` and returns the session token taken from the cookie.
    pub async fn join(&self, game: i64, username: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({ "username": username, "gameid": game }).to_string();
        let (status, headers, body) = self.post_json("/game/join", &body).await?;
        if status != StatusCode::OK {
            bail!("join failed: {status} {body}");
        }
        let cookie = headers
            .get(header::SET_COOKIE)
            .ok_or_else(|| anyhow!("join set no cookie"))?
            .to_str()?;
        session_from_set_cookie(cookie).ok_or_else(|| anyhow!("malformed cookie {cookie}"))
    }

    /// Opens `/ws/connect` with the given origin and session cookie.
    pub async fn connect_ws(&self, origin: Option<&str>, token: Option<&str>) -> Result<WsStream, tungstenite::Error> {
        let mut req = format!("ws://{}/ws/connect", self.addr).into_client_request()?;
        let headers = req.headers_mut();
        if let Some(origin) = origin {
            headers.insert(header::ORIGIN, header_value(origin)?);
        }
        if let Some(token) = token {
            headers.insert(header::COOKIE, header_value(&format!("SessionID={token}"))?);
        }
        let (ws, _response) = connect_async(req).await?;
        Ok(ws)
    }

    pub async fn stop(self) -> anyhow::Result<()> {
        self.shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .context("server did not stop")??
    }
}

fn header_value(s: &str) -> Result<HeaderValue, tungstenite::Error> {
    HeaderValue::from_str(s).map_err(|e| tungstenite::Error::HttpFormat(e.into()))
}

/// Extracts the `SessionID` value from a `Set-Cookie` header.
pub fn session_from_set_cookie(cookie: &str) -> Option<String> {
    cookie
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(name, _)| *name == "SessionID")
        .map(|(_, value)| value.to_owned())
}

/// Next text frame, skipping control frames. Fails on close or timeout.
pub async fn next_text(ws: &mut WsStream, within: Duration) -> anyhow::Result<String> {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        let msg = tokio::time::timeout_at(deadline, ws.next())
            .await
            .context("timed out waiting for frame")?
            .ok_or_else(|| anyhow!("stream ended"))??;
        match msg {
            Message::Text(text) => return Ok(text),
            Message::Close(frame) => bail!("closed: {frame:?}"),
            _ => continue,
        }
    }
}

/// Polls `cond` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
