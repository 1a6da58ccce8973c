//! Administrative HTTP API.
//!
//! Thin pass-through endpoints over the session and dispatcher:
//! - `GET  /api/status`
//! - `GET  /api/messages`
//! - `POST /api/send-message`  `{number, message}`
//! - `POST /api/send-images`   `{phone, imageHex}`
//! - `POST /api/send-location` `{number}`
//!
//! None of these go through the coalescer.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use comanda_channels::{Dispatcher, SessionManager};
use comanda_core::bus::{Location, MessageLog, Payload};
use comanda_core::config::schema::AdminConfig;
use comanda_core::utils::jid_from_number;

/// Shared state for the admin routes.
pub struct AdminState {
    pub sessions: Arc<SessionManager>,
    pub dispatcher: Arc<Dispatcher>,
    pub log: Arc<MessageLog>,
    /// Sent by `/api/send-location`.
    pub restaurant_location: Location,
}

type SharedState = Arc<AdminState>;

type ApiResponse = (StatusCode, Json<Value>);

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/messages", get(messages_handler))
        .route("/api/send-message", post(send_message_handler))
        .route("/api/send-images", post(send_images_handler))
        .route("/api/send-location", post(send_location_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the task is dropped.
pub async fn serve(config: &AdminConfig, state: SharedState) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind admin API on {addr}"))?;

    info!(addr = %addr, "admin API listening");
    axum::serve(listener, build_router(state))
        .await
        .context("admin API server error")
}

// ─────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    number: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendImageRequest {
    phone: Option<String>,
    image_hex: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendLocationRequest {
    number: Option<String>,
}

async fn status_handler(State(state): State<SharedState>) -> Json<Value> {
    let connected = state.sessions.is_connected();
    Json(json!({
        "connected": connected,
        "status": if connected { "connected" } else { "disconnected" },
        "state": state.sessions.state().to_string(),
    }))
}

async fn messages_handler(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "messages": state.log.snapshot() }))
}

async fn send_message_handler(
    State(state): State<SharedState>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let (Some(number), Some(message)) = (non_empty(req.number), non_empty(req.message)) else {
        return bad_request("number and message are required");
    };
    let Some(jid) = jid_from_number(&number) else {
        return bad_request("number must contain digits");
    };

    deliver(&state, &jid, Payload::Text(message)).await
}

async fn send_images_handler(
    State(state): State<SharedState>,
    body: Result<Json<SendImageRequest>, JsonRejection>,
) -> ApiResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let (Some(phone), Some(image_hex)) = (non_empty(req.phone), non_empty(req.image_hex)) else {
        return bad_request("phone and imageHex are required");
    };
    let Some(jid) = jid_from_number(&phone) else {
        return bad_request("phone must contain digits");
    };
    let bytes = match hex::decode(image_hex.trim()) {
        Ok(bytes) => bytes,
        Err(e) => return bad_request(format!("imageHex is not valid hex: {e}")),
    };

    let payload = Payload::Image {
        bytes,
        caption: String::new(),
    };
    deliver(&state, &jid, payload).await
}

async fn send_location_handler(
    State(state): State<SharedState>,
    body: Result<Json<SendLocationRequest>, JsonRejection>,
) -> ApiResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let Some(number) = non_empty(req.number) else {
        return bad_request("number is required");
    };
    let Some(jid) = jid_from_number(&number) else {
        return bad_request("number must contain digits");
    };

    let payload = Payload::Location(state.restaurant_location.clone());
    deliver(&state, &jid, payload).await
}

async fn deliver(state: &AdminState, jid: &str, payload: Payload) -> ApiResponse {
    let kind = payload.kind();
    match state.dispatcher.send(jid, payload).await {
        Ok(()) => {
            info!(to = %jid, kind, "admin send delivered");
            (StatusCode::OK, Json(json!({ "success": true })))
        }
        Err(e) => {
            error!(to = %jid, kind, error = %e, "admin send failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}

fn bad_request(message: impl Into<String>) -> ApiResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": message.into() })),
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
