//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::warn;

use crate::error::ExecError;

/// An error returned to the HTTP caller as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    /// Captured generator output, when the generator itself failed.
    pub output: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            output: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "Request failed");
        }
        let body = match self.output {
            Some(output) => json!({ "error": self.message, "output": output }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ExecError> for ApiError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::RequestMalformed { .. } => Self::bad_request(err.to_string()),
            ExecError::FetchFailed { .. } => Self::new(StatusCode::BAD_GATEWAY, err.to_string()),
            ExecError::ProcessExitNonZero { ref output, .. } => Self {
                output: output.clone(),
                ..Self::internal(err.to_string())
            },
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<patternd_core::Error> for ApiError {
    fn from(err: patternd_core::Error) -> Self {
        match &err {
            patternd_core::Error::PatternNotFound(_) => Self::not_found(err.to_string()),
            patternd_core::Error::InvalidPatternName(_) => Self::bad_request(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}
