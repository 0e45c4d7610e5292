use crate::{config::Config, housekeeping, sse, ws};
use anyhow::{Context, Result};
use axum::extract::ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade};
use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Multipart, Path, State},
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use channel_api::{BROADCAST_PREFIX, CHANNELS_PATH, EVENT_STREAM, LISTEN_PREFIX, MESSAGE_FIELD};
use fanoutcore::Hub;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            hub: Hub::with_drain_grace(config.drain_grace),
            config,
        }
    }
}

/// Build the HTTP application router.
pub fn build_router(state: AppState) -> Router {
    let broadcast_named = format!("{BROADCAST_PREFIX}*name");
    let listen_named = format!("{LISTEN_PREFIX}*name");
    Router::new()
        .route(CHANNELS_PATH, get(channels).fallback(not_found))
        .route(BROADCAST_PREFIX, any(broadcast_unnamed))
        .route(&broadcast_named, any(broadcast))
        .route(LISTEN_PREFIX, get(listen_unnamed).fallback(not_found))
        .route(&listen_named, get(listen).fallback(not_found))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "404 page not found\n")
}

async fn channels(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(state.hub.channels()),
    )
}

async fn broadcast(
    State(state): State<AppState>,
    Path(name): Path<String>,
    req: Request<Body>,
) -> Response {
    publish(&state, &name, req).await
}

async fn broadcast_unnamed(State(state): State<AppState>, req: Request<Body>) -> Response {
    publish(&state, "", req).await
}

async fn publish(state: &AppState, channel: &str, req: Request<Body>) -> Response {
    let message = request_message(state, req).await;
    state.hub.publish(channel, &message);
    (
        StatusCode::OK,
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        "OK\n",
    )
        .into_response()
}

/// The `message` form value from a urlencoded or multipart body, falling back
/// to the query string. Missing means empty.
async fn request_message(state: &AppState, req: Request<Body>) -> String {
    let query = req.uri().query().map(str::to_owned);
    let headers = req.headers().clone();
    if is_multipart(&headers) {
        match Multipart::from_request(req, state).await {
            Ok(multipart) => {
                if let Some(message) = multipart_field(multipart).await {
                    return message;
                }
            }
            Err(rejection) => warn!(error = %rejection, "unreadable multipart body"),
        }
        return form_message(query.as_deref(), &HeaderMap::new(), &[]);
    }
    let body = Bytes::from_request(req, state).await.unwrap_or_default();
    form_message(query.as_deref(), &headers, &body)
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false)
}

async fn multipart_field(mut multipart: Multipart) -> Option<String> {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some(MESSAGE_FIELD) {
            return field.text().await.ok();
        }
    }
    None
}

/// The `message` form value: urlencoded body first, then the query string.
/// Missing means empty.
pub fn form_message(query: Option<&str>, headers: &HeaderMap, body: &[u8]) -> String {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if is_form {
        if let Some(message) = form_field(body) {
            return message;
        }
    }
    query
        .and_then(|q| form_field(q.as_bytes()))
        .unwrap_or_default()
}

fn form_field(input: &[u8]) -> Option<String> {
    url::form_urlencoded::parse(input)
        .find(|(k, _)| k == MESSAGE_FIELD)
        .map(|(_, v)| v.into_owned())
}

async fn listen(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    subscribe(state, name, &headers, upgrade)
}

async fn listen_unnamed(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    subscribe(state, String::new(), &headers, upgrade)
}

fn subscribe(
    state: AppState,
    channel: String,
    headers: &HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if wants_event_stream(headers) {
        let subscription = state.hub.subscribe(&channel);
        return sse::stream(subscription, state.config.keepalive).into_response();
    }
    match upgrade {
        Ok(upgrade) => {
            let hub = state.hub.clone();
            upgrade
                .on_upgrade(move |socket| ws::relay(socket, hub, channel))
                .into_response()
        }
        Err(rejection) => {
            warn!(channel = %channel, error = %rejection, "websocket upgrade failed");
            rejection.into_response()
        }
    }
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains(EVENT_STREAM))
}

/// Serve until the listener fails. Binding errors are returned to the caller.
pub async fn run_http_server(config: Config) -> Result<()> {
    let addr = config.resolve_addr().await?;
    let state = AppState::new(config);
    if let Some(ttl) = state.config.channel_ttl {
        housekeeping::spawn_pruner(state.hub.clone(), ttl);
    }
    let server = axum::Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {addr}"))?
        .serve(build_router(state).into_make_service());
    info!(addr = %server.local_addr(), "listening");
    server.await?;
    Ok(())
}
