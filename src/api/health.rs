//! Health and version API
//!
//! /health aggregates the liveness of the managed services; /version
//! reports the agent version and the working-tree revision.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::not_found;
use crate::config::constants::VERSION;
use crate::domain::Operation;
use crate::infra::AuditRecord;
use crate::services::{systemd, update};
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    success: bool,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    success: bool,
    version: &'static str,
    revision: String,
    started_at: DateTime<Utc>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check).fallback(not_found))
        .route("/version", get(version).fallback(not_found))
}

/// GET /health
///
/// Healthy only when both the application and the reverse proxy report
/// active. Any failure to determine a state counts as unhealthy.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let app = systemd::is_active(&state, &state.config.app_service).await;
    let proxy = systemd::is_active(&state, &state.config.proxy_service).await;

    let healthy = matches!(app, Ok(true)) && matches!(proxy, Ok(true));
    let outcome = if healthy { "healthy" } else { "unhealthy" };

    let op = Operation::HealthCheck;
    state
        .audit
        .append(AuditRecord::new(op.kind(), op.target(), outcome));

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            success: healthy,
            status: outcome,
        }),
    )
}

/// GET /version
async fn version(State(state): State<Arc<AppState>>) -> Json<VersionResponse> {
    let revision = update::current_revision(&state).await;
    Json(VersionResponse {
        success: true,
        version: VERSION,
        revision,
        started_at: state.started_at,
    })
}
