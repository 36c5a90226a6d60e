//! Error type bridging domain errors and HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cinetheque_core::CoreError;
use serde::Serialize;
use std::fmt;

/// Application error for web handlers.
///
/// Wraps domain errors into an HTTP status, a stable machine-readable
/// code and a user-facing message. Internal details ride along as an
/// opaque source for logging and are never serialized to the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    source: Option<anyhow::Error>,
}

impl ApiError {
    /// Create an error with an explicit status and code.
    #[must_use]
    pub const fn new(status: StatusCode, code: &'static str, message: String) -> Self {
        Self {
            status,
            code,
            message,
            source: None,
        }
    }

    /// Attach the underlying error for 5xx logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message.into())
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message.into())
    }

    /// 403 Forbidden.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message.into())
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message.into())
    }

    /// 409 Conflict.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message.into())
    }

    /// 500 Internal Server Error with a generic message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            message.into(),
        )
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { message } => Self::bad_request(message),
            CoreError::Conflict { message } => Self::conflict(message),
            CoreError::NotFound { entity } => Self::not_found(format!("{entity} not found")),
            CoreError::Store(detail) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "the ledger store is temporarily unavailable".to_string(),
            )
            .with_source(anyhow::anyhow!(detail)),
            CoreError::Processor(detail) => Self::new(
                StatusCode::BAD_GATEWAY,
                "PROCESSOR_ERROR",
                "the payment processor rejected the operation".to_string(),
            )
            .with_source(anyhow::anyhow!(detail)),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    error = %source,
                    "request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "request failed"
                ),
            }
        }

        let body = ErrorBody {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_code_and_message() {
        let err = ApiError::bad_request("reason must not be blank");
        assert_eq!(err.to_string(), "[BAD_REQUEST] reason must not be blank");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn domain_errors_map_to_expected_statuses() {
        let cases = [
            (CoreError::validation("bad"), StatusCode::BAD_REQUEST),
            (CoreError::conflict("busy"), StatusCode::CONFLICT),
            (CoreError::not_found("Member"), StatusCode::NOT_FOUND),
            (CoreError::store("down"), StatusCode::SERVICE_UNAVAILABLE),
            (
                CoreError::Processor("declined".into()),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (domain, status) in cases {
            assert_eq!(ApiError::from(domain).status(), status);
        }
    }
}
