//! API error type rendered as `{"error": CODE, "message": text}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use spendflow_core::approval::ApprovalError;
use spendflow_shared::AppError;

/// Errors returned by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failure inside the approval engine.
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    /// Request-level failure raised by the HTTP layer.
    #[error(transparent)]
    App(#[from] AppError),
}

impl ApiError {
    /// Shorthand for a 400 validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::App(AppError::Validation(message.into()))
    }

    /// Shorthand for a 403 error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::App(AppError::Forbidden(message.into()))
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        let code = match self {
            Self::Approval(e) => e.status_code(),
            Self::App(e) => e.status_code(),
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Returns the error code for the response body.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Approval(e) => e.error_code(),
            Self::App(e) => e.error_code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Server-side details stay in the logs.
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(json!({
                "error": self.error_code(),
                "message": message
            })),
        )
            .into_response()
    }
}
