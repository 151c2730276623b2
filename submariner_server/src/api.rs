//! HTTP surface.
//!
//! Routes:
//! - `POST /game/create`: allocate a game, returns `{"gameid": n}`.
//! - `POST /game/join`: join a game, sets the `SessionID` cookie.
//! - `GET /ws/connect`: upgrade to a websocket bound to the session's slot.
//!
//! Every route passes through the CORS middleware, which answers `OPTIONS`
//! preflights directly.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::BytesRejection,
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Request, State,
    },
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
            ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, COOKIE, ORIGIN, SET_COOKIE,
        },
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use submariner_shared::{
    config::ServerConfig,
    net::{CreateGameRequest, CreateGameResponse, JoinGameRequest, JoinGameResponse, SESSION_COOKIE},
};
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::{connection::serve_socket, error::ApiError, registry::GameRegistry, validation::StateValidator};

const ALLOWED_METHODS: &str = "POST, GET, OPTIONS, PUT, DELETE";
const ALLOWED_HEADERS: &str =
    "Accept, Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization";

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: GameRegistry,
    pub config: Arc<ServerConfig>,
    pub validator: Arc<dyn StateValidator>,
    pub shutdown: watch::Receiver<bool>,
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/game/create", post(create_game))
        .route("/game/join", post(join_game))
        .route("/ws/connect", get(ws_connect))
        .layer(middleware::from_fn_with_state(state.clone(), cors))
        .with_state(state)
}

async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let allow_origin = request
        .headers()
        .get(ORIGIN)
        .filter(|o| {
            o.to_str()
                .is_ok_and(|o| state.config.is_origin_allowed(o))
        })
        .cloned()
        .or_else(|| {
            state
                .config
                .allowed_origins
                .first()
                .and_then(|o| HeaderValue::from_str(o).ok())
        });

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    if let Some(origin) = allow_origin {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
    headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    response
}

fn parse_body<T: DeserializeOwned>(
    body: Result<Bytes, BytesRejection>,
    bad_json: &str,
) -> Result<T, ApiError> {
    let bytes = body.map_err(|e| {
        error!(error = %e, "Error while reading request body");
        ApiError::Internal("Internal Server Error".into())
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        debug!(error = %e, "Error while unmarshalling request body");
        ApiError::BadRequest(bad_json.into())
    })
}

async fn create_game(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<CreateGameResponse>, ApiError> {
    let CreateGameRequest {} = parse_body(body, "Bad request; Improper JSON.")?;
    let id = state.registry.create_game();
    Ok(Json(CreateGameResponse { gameid: id.0 }))
}

async fn join_game(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let req: JoinGameRequest = parse_body(
        body,
        "Incorrect Input for Username or GameID; Expected: Username(string); GameID(int);",
    )?;
    let token = state.registry.join_game(req.gameid, &req.username)?;
    let cookie = format!("{SESSION_COOKIE}={token}; Path=/");
    Ok((
        [(SET_COOKIE, cookie)],
        Json(JoinGameResponse {
            token: token.to_string(),
        }),
    )
        .into_response())
}

/// Value of the session cookie, if the request carries one.
fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

async fn ws_connect(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let origin = headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !state.config.is_origin_allowed(origin) {
        warn!(%origin, "Rejected websocket from disallowed origin");
        return Err(ApiError::Forbidden("Origin not allowed".into()));
    }

    let token = session_cookie(&headers).ok_or_else(|| ApiError::Forbidden("Missing session".into()))?;
    let slot = state.registry.connect(token)?;

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            warn!(slot = slot.0, error = %rejection, "Could not open connection");
            return Ok(rejection.into_response());
        }
    };

    let AppState {
        registry,
        validator,
        shutdown,
        ..
    } = state;
    Ok(upgrade.on_upgrade(move |socket| serve_socket(socket, registry, slot, validator, shutdown)))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use serde_json::{json, Value};
    use submariner_shared::game::{GameId, PlayerSlot};
    use tower::ServiceExt;

    use super::*;
    use crate::validation::AcceptAll;

    fn app() -> (Router, GameRegistry, watch::Sender<bool>) {
        let registry = GameRegistry::new();
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = AppState {
            registry: registry.clone(),
            config: Arc::new(ServerConfig::default()),
            validator: Arc::new(AcceptAll),
            shutdown: stop_rx,
        };
        (build_router(state), registry, stop_tx)
    }

    fn post(uri: &str, body: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_game_returns_sequential_ids() {
        let (app, registry, _stop) = app();
        for n in 0..3 {
            let res = app.clone().oneshot(post("/game/create", "{}")).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(body_json(res).await, json!({ "gameid": n }));
        }
        assert_eq!(registry.game_count(), 3);
    }

    #[tokio::test]
    async fn create_game_rejects_other_methods_and_bad_json() {
        let (app, registry, _stop) = app();
        for method in [Method::GET, Method::PUT, Method::PATCH] {
            let req = HttpRequest::builder()
                .method(method)
                .uri("/game/create")
                .body(Body::from("{}"))
                .unwrap();
            let res = app.clone().oneshot(req).await.unwrap();
            assert_ne!(res.status(), StatusCode::OK);
        }

        let res = app.clone().oneshot(post("/game/create", "{oops")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(res).await["error"].is_string());
        assert_eq!(registry.game_count(), 0);
    }

    #[tokio::test]
    async fn join_sets_session_cookie() {
        let (app, registry, _stop) = app();
        registry.create_game();

        let res = app
            .oneshot(post("/game/join", r#"{"username":"bob","gameid":0}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res.headers()[SET_COOKIE].to_str().unwrap().to_owned();
        let body = body_json(res).await;
        let token = body["token"].as_str().unwrap();

        assert_eq!(cookie, format!("SessionID={token}; Path=/"));
        assert_eq!(registry.connect(token), Ok(PlayerSlot(0)));
        assert_eq!(registry.game_mode(GameId(0)).unwrap().players, vec![PlayerSlot(0)]);
    }

    #[tokio::test]
    async fn join_unknown_game_is_bad_request_without_cookie() {
        let (app, registry, _stop) = app();
        let res = app
            .oneshot(post("/game/join", r#"{"username":"bob","gameid":99}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(res.headers().get(SET_COOKIE).is_none());
        assert_eq!(body_json(res).await, json!({ "error": "Invalid GameID" }));
        assert_eq!(registry.player_count(), 0);
    }

    #[tokio::test]
    async fn join_validates_username_and_json() {
        let (app, registry, _stop) = app();
        registry.create_game();

        let res = app
            .clone()
            .oneshot(post("/game/join", r#"{"username":"","gameid":0}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await, json!({ "error": "Invalid Username" }));

        let res = app
            .oneshot(post("/game/join", r#"{"username":7,"gameid":"x"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(res).await["error"].is_string());
        assert_eq!(registry.player_count(), 0);
    }

    #[tokio::test]
    async fn join_with_missing_fields_is_bad_request() {
        let (app, registry, _stop) = app();
        registry.create_game();

        for body in [r#"{"username":"bob"}"#, r#"{"gameid":0}"#, "{}"] {
            let res = app.clone().oneshot(post("/game/join", body)).await.unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body {body}");
            assert!(res.headers().get(SET_COOKIE).is_none());
            assert!(body_json(res).await["error"].is_string());
        }
        assert_eq!(registry.player_count(), 0);
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn options_preflight_short_circuits_with_cors_headers() {
        let (app, registry, _stop) = app();
        let req = HttpRequest::builder()
            .method(Method::OPTIONS)
            .uri("/game/create")
            .header(ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_METHODS], ALLOWED_METHODS);
        assert_eq!(registry.game_count(), 0);
    }

    #[tokio::test]
    async fn ws_connect_requires_allowed_origin_and_known_session() {
        let (app, registry, _stop) = app();
        registry.create_game();
        let token = registry.join_game(0, "bob").unwrap();

        let request = |origin: Option<&str>, cookie: Option<String>| {
            let mut b = HttpRequest::builder().uri("/ws/connect");
            if let Some(origin) = origin {
                b = b.header(ORIGIN, origin);
            }
            if let Some(cookie) = cookie {
                b = b.header(COOKIE, cookie);
            }
            b.body(Body::empty()).unwrap()
        };

        let cases = [
            request(None, Some(format!("SessionID={token}"))),
            request(Some("http://evil.example"), Some(format!("SessionID={token}"))),
            request(Some("http://localhost:3000"), None),
            request(Some("http://localhost:3000"), Some("SessionID=unknown".into())),
        ];
        for req in cases {
            let res = app.clone().oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::FORBIDDEN);
        }
        assert!(!registry.is_bound(PlayerSlot(0)));
    }

    #[test]
    fn session_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; SessionID=abc-123; x=y"));
        assert_eq!(session_cookie(&headers), Some("abc-123"));

        headers.insert(COOKIE, HeaderValue::from_static("Session=abc"));
        assert_eq!(session_cookie(&headers), None);
    }
}
