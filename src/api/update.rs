//! Application update API
//!
//! /update-bayanat endpoint; the actual pipeline lives in services::update.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::api::{not_found, MessageResponse};
use crate::domain::Operation;
use crate::error::{ApiError, ApiResult};
use crate::infra::AuditRecord;
use crate::services::update::{self, UpdateError, UpdateOutcome};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UpdateRequest {
    /// Bypass the "already up to date" short-circuit.
    #[serde(default)]
    pub force: bool,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/update-bayanat", post(update_bayanat).fallback(not_found))
}

/// POST /update-bayanat  {} or {"force": true}
///
/// Suspends until the pipeline reaches a terminal state; a disconnecting
/// client does not interrupt it. An absent body means default options; a
/// body that fails to decode is rejected before the pipeline runs.
async fn update_bayanat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => UpdateRequest::default(),
        Err(rej) => {
            let kind = Operation::UpdateApplication { force: false }.kind();
            state
                .audit
                .append(AuditRecord::new(kind, None, "bad_request").detail(rej.body_text()));
            return Err(ApiError::bad_request("Invalid update request body"));
        }
    };
    let op = Operation::UpdateApplication {
        force: request.force,
    };

    match update::run(&state, request.force).await {
        Ok(UpdateOutcome::Updated { revision }) => {
            state.audit.append(
                AuditRecord::new(op.kind(), op.target(), "success")
                    .detail(format!("revision {revision}")),
            );
            Ok(Json(MessageResponse::new(format!(
                "Updated to commit {revision}"
            ))))
        }
        Ok(UpdateOutcome::AlreadyUpToDate) => {
            state
                .audit
                .append(AuditRecord::new(op.kind(), op.target(), "no-op"));
            Ok(Json(MessageResponse::new("Already up to date")))
        }
        Err(UpdateError::InProgress) => {
            state
                .audit
                .append(AuditRecord::new(op.kind(), op.target(), "rejected")
                    .detail("update already in progress"));
            Err(ApiError::conflict("Update already in progress"))
        }
        Err(err @ UpdateError::Stage { .. }) => {
            state.audit.append(
                AuditRecord::new(op.kind(), op.target(), "failure").detail(err.to_string()),
            );
            Err(ApiError::internal(err.to_string()))
        }
    }
}
