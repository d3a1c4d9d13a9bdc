//! Unified error handling
//!
//! `ApiError` implements `IntoResponse` so every failure path produces the
//! same flat `{"success": false, "error": "..."}` wire shape.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::domain::ValidationError;

/// Failure response body. Every error leaving the agent looks like this.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Unified API error type.
#[derive(Debug)]
pub enum ApiError {
    /// 400 - missing or malformed request parameter
    BadRequest(String),
    /// 403 - identifier rejected by the validator
    Rejected(ValidationError),
    /// 404 - unknown path
    NotFound,
    /// 409 - update already in progress
    Conflict(String),
    /// 500 - execution or internal failure
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Rejected(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Rejected(err) => (StatusCode::FORBIDDEN, err.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(m) => write!(f, "Bad request: {m}"),
            ApiError::Rejected(e) => write!(f, "{e}"),
            ApiError::NotFound => write!(f, "Not found"),
            ApiError::Conflict(m) => write!(f, "Conflict: {m}"),
            ApiError::Internal(m) => write!(f, "Internal error: {m}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Convenience alias
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ValidationError;

    #[test]
    fn test_error_response_shape() {
        let resp = ErrorResponse::new("Invalid service 'sshd'");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Invalid service 'sshd'");
    }

    #[test]
    fn test_validation_error_converts() {
        let err: ApiError = ValidationError::UnknownService("sshd".to_string()).into();
        assert!(matches!(err, ApiError::Rejected(_)));
        assert_eq!(err.to_string(), "Invalid service 'sshd'");
    }
}
