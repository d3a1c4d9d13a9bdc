//! systemd service operations
//!
//! Thin wrappers that run validator-approved `systemctl` invocations
//! through the executor and interpret the results. Handlers stay thin.

use thiserror::Error;

use crate::domain::{validate, CommandKind, ExecOutcome, ValidationError};
use crate::state::AppState;

/// Status of one managed unit, as reported by systemctl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    /// "active" or "inactive"
    pub active: String,
    /// "enabled" or "disabled"
    pub enabled: String,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Rejected(#[from] ValidationError),
    #[error("{0}")]
    Exec(String),
}

/// Restart a managed unit (elevated).
pub async fn restart_service(state: &AppState, name: &str) -> Result<(), ServiceError> {
    let spec = validate(CommandKind::RestartService, name, &state.config)?;
    let result = state.executor.execute(&spec).await;

    if result.success() {
        tracing::info!(service = %name, "Service restarted");
        Ok(())
    } else {
        tracing::error!(service = %name, reason = %result.failure_reason(), "Service restart failed");
        Err(ServiceError::Exec(format!(
            "Failed to restart service: {}",
            result.failure_reason()
        )))
    }
}

/// Query active and enabled state of a managed unit.
///
/// `systemctl is-active` exits non-zero for inactive units; that is a
/// valid answer, not an execution failure.
pub async fn service_status(state: &AppState, name: &str) -> Result<ServiceStatus, ServiceError> {
    let active = query(state, CommandKind::ServiceActive, name).await?;
    let enabled = query(state, CommandKind::ServiceEnabled, name).await?;

    Ok(ServiceStatus {
        active: normalize(&active, "active"),
        enabled: normalize(&enabled, "enabled"),
    })
}

/// True when the unit reports `active`.
pub async fn is_active(state: &AppState, name: &str) -> Result<bool, ServiceError> {
    let answer = query(state, CommandKind::ServiceActive, name).await?;
    Ok(answer.trim() == "active")
}

async fn query(state: &AppState, kind: CommandKind, name: &str) -> Result<String, ServiceError> {
    let spec = validate(kind, name, &state.config)?;
    let result = state.executor.execute(&spec).await;

    match result.outcome {
        ExecOutcome::Success | ExecOutcome::Failed => Ok(result.stdout_tail),
        _ => Err(ServiceError::Exec(result.failure_reason())),
    }
}

fn normalize(raw: &str, expected: &str) -> String {
    if raw.trim() == expected {
        expected.to_string()
    } else {
        match expected {
            "active" => "inactive".to_string(),
            _ => "disabled".to_string(),
        }
    }
}
