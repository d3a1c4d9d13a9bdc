//! Package installation API
//!
//! /install-package endpoint

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::api::{not_found, MessageResponse};
use crate::error::{ApiError, ApiResult};
use crate::domain::{validate, CommandKind, Operation};
use crate::infra::AuditRecord;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PackageRequest {
    pub package: Option<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/install-package", post(install_package).fallback(not_found))
}

/// POST /install-package  {"package": <name>}
async fn install_package(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PackageRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let kind = Operation::InstallPackage {
        name: String::new(),
    }
    .kind();
    let bad_request = |detail: String| {
        state
            .audit
            .append(AuditRecord::new(kind, None, "bad_request").detail(detail));
        ApiError::bad_request("Missing or invalid 'package' parameter")
    };

    let Json(request) = payload.map_err(|rej| bad_request(rej.body_text()))?;
    let op = match request.package {
        Some(name) if !name.is_empty() => Operation::InstallPackage { name },
        _ => return Err(bad_request("'package' missing or empty".to_string())),
    };
    let name = op.target().unwrap_or_default().to_string();

    let spec = match validate(CommandKind::InstallPackage, &name, &state.config) {
        Ok(spec) => spec,
        Err(e) => {
            state.audit.append(
                AuditRecord::new(op.kind(), op.target(), "rejected").detail(e.to_string()),
            );
            return Err(e.into());
        }
    };

    let result = state.executor.execute(&spec).await;
    if result.success() {
        tracing::info!(package = %name, "Package installed");
        state
            .audit
            .append(AuditRecord::new(op.kind(), op.target(), "success"));
        Ok(Json(MessageResponse::new(format!(
            "Package '{name}' installed"
        ))))
    } else {
        let reason = result.failure_reason();
        tracing::error!(package = %name, reason = %reason, "Package install failed");
        state.audit.append(
            AuditRecord::new(op.kind(), op.target(), "failure").detail(reason.clone()),
        );
        Err(ApiError::internal(format!(
            "Failed to install package: {reason}"
        )))
    }
}
