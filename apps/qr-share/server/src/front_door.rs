use std::{borrow::Cow, sync::Arc};

use axum::{
    body::Body,
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Path, Request, State, WebSocketUpgrade,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use qr_share_core::{ChannelId, SessionEngine};
use serde_json::json;
use tower::ServiceExt;
use tower_http::{services::ServeFile, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::share::SharedFile;

/// Everything the HTTP handlers need for one sharing session.
pub struct AppState {
    engine: SessionEngine,
    file: SharedFile,
    page: String,
    metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(
        engine: SessionEngine,
        file: SharedFile,
        page: String,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            engine,
            file,
            page,
            metrics,
        }
    }

    pub fn engine(&self) -> &SessionEngine {
        &self.engine
    }
}

/// One listener, three request kinds: `/ws` upgrades become viewer channels, the
/// shared file's name downloads it, and every other path gets the status page.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(page_handler))
        .route("/ws", get(ws_handler))
        .route("/:file_name", get(file_handler))
        .route("/-/healthz", get(health_handler))
        .route("/-/stats", get(stats_handler))
        .route("/-/metrics", get(metrics_handler))
        .fallback(page_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn page_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(state.page.clone())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.snapshot())
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn file_handler(
    State(state): State<Arc<AppState>>,
    Path(file_name): Path<String>,
    request: Request,
) -> Response {
    file_or_page(&state, &file_name, request).await
}

async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: Option<WebSocketUpgrade>,
    request: Request,
) -> Response {
    let Some(ws) = ws else {
        // Plain GET: a shared file may legitimately be called "ws".
        return file_or_page(&state, "ws", request).await;
    };

    if state.engine.phase().is_terminal() {
        return (StatusCode::GONE, "sharing session has ended").into_response();
    }
    ws.on_upgrade(move |socket| handle_viewer(socket, state))
        .into_response()
}

async fn file_or_page(state: &AppState, requested: &str, request: Request) -> Response {
    if !state.file.matches(requested) {
        return Html(state.page.clone()).into_response();
    }

    info!(file = state.file.name(), "serving download");
    counter!("qr_share_downloads_total", 1);
    let response = match ServeFile::new(state.file.path()).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let mut response = response.map(Body::new);
    if response.status().is_success() {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, state.file.content_disposition());
    }
    response
}

/// Serves one viewer channel until the peer leaves, the engine evicts it, or the
/// session ends.
async fn handle_viewer(socket: WebSocket, state: Arc<AppState>) {
    let channel_id: ChannelId = Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let registration = match state.engine.register_channel(channel_id) {
        Ok(registration) => registration,
        Err(err) => {
            debug!(channel_id = %channel_id, error = %err, "refusing viewer");
            let _ = ws_tx
                .send(close_message(close_code::AWAY, "session ended"))
                .await;
            return;
        }
    };
    let mut eviction = registration.eviction;
    let mut eviction_armed = true;
    let mut shutdown = state.engine.subscribe();

    let farewell = loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    state.engine.handle_payload(channel_id, &text);
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        state.engine.handle_payload(channel_id, text);
                    }
                    Err(_) => {
                        debug!(channel_id = %channel_id, "ignoring non-UTF8 binary frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(
                        channel_id = %channel_id,
                        reason = ?frame.map(|f| f.reason.to_string()),
                        "viewer closed websocket"
                    );
                    break None;
                }
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    warn!(channel_id = %channel_id, error = %err, "error receiving from viewer");
                    break None;
                }
                None => break None,
            },
            evicted = &mut eviction, if eviction_armed => {
                eviction_armed = false;
                if evicted.is_ok() {
                    break Some(close_message(close_code::POLICY, "heartbeat timeout"));
                }
            }
            _ = shutdown.wait() => {
                break Some(close_message(close_code::NORMAL, "session ended"));
            }
        }
    };

    if let Some(message) = farewell {
        if let Err(err) = ws_tx.send(message).await {
            debug!(channel_id = %channel_id, error = %err, "failed to send close frame");
        }
    }
    state.engine.record_channel_closed(channel_id);
    debug!(channel_id = %channel_id, "viewer task finished");
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Cow::Borrowed(reason),
    }))
}
