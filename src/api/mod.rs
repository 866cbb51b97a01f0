// HTTP adapter for the chat transport: command dispatch, health and metrics.

use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::commands::{CommandHandler, CommandInvocation, CommandResponse};
use crate::error::BotError;
use crate::metrics;

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub commands: Arc<CommandHandler>,
}

// ── Error helper ──────────────────────────────────────────────────────

/// HTTP status for an error kind.
pub fn status_for(err: &BotError) -> StatusCode {
    match err {
        BotError::Validation(_) | BotError::UnknownType { .. } => StatusCode::BAD_REQUEST,
        BotError::Unauthorized => StatusCode::FORBIDDEN,
        BotError::InvalidState { .. }
        | BotError::LimitExceeded { .. }
        | BotError::Conflict(_)
        | BotError::Rejected(_) => StatusCode::CONFLICT,
        BotError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        BotError::NotFound { .. } => StatusCode::NOT_FOUND,
        BotError::ExternalUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        BotError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_error(err: &BotError) -> impl IntoResponse {
    (status_for(err), Json(CommandResponse::failure(err)))
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(commands: Arc<CommandHandler>) -> Router {
    let state = AppState { commands };

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/commands", post(run_command))
        .with_state(state)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "clanbot" }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

async fn run_command(
    State(state): State<AppState>,
    Json(invocation): Json<CommandInvocation>,
) -> impl IntoResponse {
    match state.commands.dispatch(invocation).await {
        Ok(data) => (StatusCode::OK, Json(CommandResponse::success(data))).into_response(),
        Err(e) => json_error(&e).into_response(),
    }
}
