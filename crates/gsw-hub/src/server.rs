//! HTTP and WebSocket surface. Snapshot handlers render the store on
//! demand; the live channel answers each viewer request with a freshly
//! rendered, filtered snapshot.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use gsw_core::{render, HostStatusStore, OutputFormat, RenderError, RenderOptions};
use serde::Deserialize;
use tracing::{info, warn};

const INDEX_TEMPLATE: &str = include_str!("../static/index.html");

pub struct AppState {
    pub store: Arc<HostStatusStore>,
    pub interval: Duration,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/gpustat.html", get(html_handler))
        .route("/gpustat.ansi", get(ansi_handler))
        .route("/gpustat.txt", get(plain_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SnapshotQuery {
    #[serde(default)]
    full: Option<String>,
    #[serde(default)]
    nodes: Option<String>,
}

/// Missing means true; only "yes"/"true"/"1" count as true otherwise.
fn parse_bool(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => matches!(v.to_lowercase().as_str(), "yes" | "true" | "1"),
    }
}

fn parse_node_list(value: Option<&str>) -> Option<HashSet<String>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.split(',').map(|s| s.trim().to_string()).collect())
}

fn snapshot_response(state: &AppState, format: OutputFormat, query: &SnapshotQuery) -> Response {
    let options = RenderOptions {
        format,
        host_filter: parse_node_list(query.nodes.as_deref()),
        wrap_full: parse_bool(query.full.as_deref()),
    };
    match render(&state.store, &options) {
        Ok(body) => (
            [
                (
                    header::CONTENT_TYPE,
                    format!("text/{}; charset=utf-8", format.as_str()),
                ),
                (header::CONTENT_LANGUAGE, "en".to_string()),
            ],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, event = "render_failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn html_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    snapshot_response(&state, OutputFormat::Html, &query)
}

async fn ansi_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    snapshot_response(&state, OutputFormat::Ansi, &query)
}

async fn plain_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    snapshot_response(&state, OutputFormat::Plain, &query)
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let page = INDEX_TEMPLATE.replace("{{interval}}", &state.interval.as_millis().to_string());
    (
        [(header::CONTENT_LANGUAGE, "en")],
        Html(page),
    )
        .into_response()
}

/// One inbound viewer request: an optional comma-separated host filter.
#[derive(Debug, Deserialize)]
struct LiveRequest {
    #[serde(default)]
    nodes: Option<String>,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| live_channel(socket, state))
}

/// Per-viewer request/response loop. Each request gets a decorated,
/// non-wrapped snapshot pushed back over the same socket; malformed
/// payloads are logged and skipped, the socket stays open.
async fn live_channel(mut socket: WebSocket, state: Arc<AppState>) {
    info!(event = "viewer_connected");
    while let Some(received) = socket.recv().await {
        let msg = match received {
            Ok(msg) => msg,
            Err(err) => {
                warn!(error = %err, event = "viewer_read_error");
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                if text == "close" {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                let request: LiveRequest = match serde_json::from_str(&text) {
                    Ok(request) => request,
                    Err(err) => {
                        warn!(error = %err, event = "malformed_live_request");
                        continue;
                    }
                };
                match live_snapshot(&state.store, request.nodes.as_deref()) {
                    Ok(body) => {
                        if socket.send(Message::Text(body)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, event = "live_render_failed"),
                }
            }
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }
    info!(event = "viewer_disconnected");
}

fn live_snapshot(store: &HostStatusStore, nodes: Option<&str>) -> Result<String, RenderError> {
    let options = RenderOptions {
        format: OutputFormat::Html,
        host_filter: parse_node_list(nodes),
        wrap_full: false,
    };
    render(store, &options)
}
