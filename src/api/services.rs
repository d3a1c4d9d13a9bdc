//! Service management API
//!
//! /restart-service and /service-status endpoints

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::{not_found, MessageResponse};
use crate::domain::Operation;
use crate::error::{ApiError, ApiResult};
use crate::infra::AuditRecord;
use crate::services::systemd::{self, ServiceError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ServiceRequest {
    pub service: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatusResponse {
    pub success: bool,
    pub service: String,
    pub status: String,
    pub enabled: String,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/restart-service", post(restart_service).fallback(not_found))
        .route("/service-status", post(service_status).fallback(not_found))
}

/// POST /restart-service  {"service": <name>}
async fn restart_service(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ServiceRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let op = require_service(&state, payload, |name| Operation::RestartService { name })?;
    let name = op.target().unwrap_or_default().to_string();

    match systemd::restart_service(&state, &name).await {
        Ok(()) => {
            state
                .audit
                .append(AuditRecord::new(op.kind(), op.target(), "success"));
            Ok(Json(MessageResponse::new("Service restarted")))
        }
        Err(e) => Err(audit_failure(&state, &op, e)),
    }
}

/// POST /service-status  {"service": <name>}
async fn service_status(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ServiceRequest>, JsonRejection>,
) -> ApiResult<Json<ServiceStatusResponse>> {
    let op = require_service(&state, payload, |name| Operation::ServiceStatus { name })?;
    let name = op.target().unwrap_or_default().to_string();

    match systemd::service_status(&state, &name).await {
        Ok(status) => {
            state.audit.append(
                AuditRecord::new(op.kind(), op.target(), "success")
                    .detail(status.active.clone()),
            );
            Ok(Json(ServiceStatusResponse {
                success: true,
                service: name,
                status: status.active,
                enabled: status.enabled,
            }))
        }
        Err(e) => Err(audit_failure(&state, &op, e)),
    }
}

/// Decode the body into an [`Operation`] carrying a non-empty `service`
/// value. A missing or malformed parameter is audited and rejected before
/// the validator runs.
fn require_service(
    state: &AppState,
    payload: Result<Json<ServiceRequest>, JsonRejection>,
    make: fn(String) -> Operation,
) -> ApiResult<Operation> {
    // The audit kind depends only on the variant, not the identifier.
    let kind = make(String::new()).kind();
    let bad_request = |detail: String| {
        state
            .audit
            .append(AuditRecord::new(kind, None, "bad_request").detail(detail));
        ApiError::bad_request("Missing or invalid 'service' parameter")
    };

    let Json(request) = payload.map_err(|rej| bad_request(rej.body_text()))?;
    match request.service {
        Some(name) if !name.is_empty() => Ok(make(name)),
        _ => Err(bad_request("'service' missing or empty".to_string())),
    }
}

fn audit_failure(state: &AppState, op: &Operation, err: ServiceError) -> ApiError {
    match err {
        ServiceError::Rejected(e) => {
            state.audit.append(
                AuditRecord::new(op.kind(), op.target(), "rejected").detail(e.to_string()),
            );
            e.into()
        }
        ServiceError::Exec(m) => {
            state
                .audit
                .append(AuditRecord::new(op.kind(), op.target(), "failure").detail(m.clone()));
            ApiError::internal(m)
        }
    }
}
