//! API module
//!
//! HTTP handlers and router assembly. Every response body is a flat JSON
//! object carrying at least a `success` boolean.

pub mod health;
pub mod packages;
pub mod services;
pub mod update;

use std::any::Any;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::error::{ApiError, ErrorResponse};
use crate::infra::AuditRecord;
use crate::state::AppState;

/// Generic success body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Build the full API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(services::router())
        .merge(update::router())
        .merge(packages::router())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// Shared fallback for unknown paths and unmatched methods.
pub(crate) async fn not_found(State(state): State<Arc<AppState>>) -> ApiError {
    state
        .audit
        .append(AuditRecord::new("unknown", None, "not_found"));
    ApiError::NotFound
}

/// Backstop for any handler panic: generic failure to the client, full
/// detail stays server-side.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!(detail, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal server error")),
    )
        .into_response()
}
