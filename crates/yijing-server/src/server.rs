//! HTTP listener and top-level server wiring.
//!
//! This module:
//! - Spawns the two hub loops (generic events, bot adapters).
//! - Builds the `axum` router: both WebSocket upgrades, the status
//!   routes, `POST /api/divine` and the rendered images under `/output/`.
//! - Binds the configured address and serves until the process exits.
//!
//! Per-connection logic lives in `client` and `bot`; the registries live
//! in `hub_task`.

use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};
use yijing_core::{DivineRequest, Envelope};
use yijing_protocol::wire_types::{IMPLEMENTATION, MAX_FRAME_LEN, ONEBOT_VERSION};

use crate::bot::{broadcast_divination, serve_bot, BotAdapter};
use crate::client::serve_client;
use crate::config::Config;
use crate::divination::{DivinationError, Oracle};
use crate::hub_task::Hub;
use crate::types::ConnectionHandle;

/// Context shared by every route and connection, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub events: Hub<ConnectionHandle<Envelope>>,
    pub bots: Hub<Arc<BotAdapter>>,
    pub oracle: Arc<dyn Oracle>,
}

impl AppState {
    /// Spawn both hub loops on the current runtime.
    pub fn new(config: Config, oracle: Arc<dyn Oracle>) -> Self {
        let conn = &config.connection;
        let events = Hub::spawn("events", conn.hub_inbox_capacity, conn.hub_tick());
        let bots = Hub::spawn("bots", conn.hub_inbox_capacity, conn.hub_tick());

        AppState {
            config: Arc::new(config),
            events,
            bots,
            oracle,
        }
    }
}

/// `{code, message, data?}` body used by every JSON route.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub code: u16,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiResponse {
    fn ok(message: impl Into<String>, data: Value) -> Self {
        ApiResponse {
            code: StatusCode::OK.as_u16(),
            message: message.into(),
            data: Some(data),
        }
    }

    fn error(status: StatusCode, message: impl Into<String>) -> Self {
        ApiResponse {
            code: status.as_u16(),
            message: message.into(),
            data: None,
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let images = ServeDir::new(&state.config.server.output_dir);
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/onebot/ws", get(onebot_upgrade))
        .route("/api/ws/status", get(ws_status))
        .route("/api/onebot/status", get(onebot_status))
        .route("/api/divine", post(divine))
        .nest_service("/output", images)
        .with_state(state)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(MAX_FRAME_LEN)
        .max_frame_size(MAX_FRAME_LEN)
        .on_upgrade(move |socket| serve_client(socket, state))
}

async fn onebot_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(MAX_FRAME_LEN)
        .max_frame_size(MAX_FRAME_LEN)
        .on_upgrade(move |socket| serve_bot(socket, state))
}

async fn ws_status(State(state): State<AppState>) -> ApiResponse {
    ApiResponse::ok(
        "websocket service status",
        json!({
            "connected_clients": state.events.len().await,
            "server_time": chrono::Utc::now().timestamp(),
            "websocket_enabled": true,
        }),
    )
}

async fn onebot_status(State(state): State<AppState>) -> ApiResponse {
    ApiResponse::ok(
        "onebot service status",
        json!({
            "connected_clients": state.bots.len().await,
            "server_time": chrono::Utc::now().timestamp(),
            "onebot_enabled": true,
            "onebot_version": ONEBOT_VERSION,
            "implementation": IMPLEMENTATION,
        }),
    )
}

/// Run the oracle, fan the result out to generic clients, and to bots
/// when the request names a target. `{}` asks for today's reading.
async fn divine(State(state): State<AppState>, body: Bytes) -> ApiResponse {
    if body.is_empty() {
        warn!("rejecting divine request without a body");
        return ApiResponse::error(StatusCode::BAD_REQUEST, "request body is empty");
    }
    let request: DivineRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "rejecting malformed divine request");
            return ApiResponse::error(
                StatusCode::BAD_REQUEST,
                format!("invalid request body: {}", e),
            );
        }
    };

    let result = match state.oracle.divine(&request) {
        Ok(result) => result,
        Err(e @ DivinationError::UnsupportedKind(_)) => {
            return ApiResponse::error(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "divination failed");
            return ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    if let Err(e) = state.events.broadcast(Envelope::divine_result(result.clone())).await {
        error!(error = %e, "cannot broadcast divination");
    }

    if let Some(target) = request.target() {
        if let Err(e) = broadcast_divination(&state.bots, target, &result).await {
            error!(error = %e, "cannot forward divination to bots");
        }
    }

    let data = match serde_json::to_value(&result) {
        Ok(data) => data,
        Err(e) => return ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    info!(result = %result.id, "divination served over http");
    ApiResponse::ok("divination complete", data)
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Bind the configured address and serve.
pub async fn run(config: Config, oracle: Arc<dyn Oracle>) -> anyhow::Result<()> {
    let output_dir = &config.server.output_dir;
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let addr = config.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "listening");
    info!(url = %format!("ws://{}/ws", addr), "generic transport");
    info!(url = %format!("ws://{}/onebot/ws", addr), "bot transport");

    serve(listener, AppState::new(config, oracle)).await
}
