use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Rejections raised before a session starts. The display strings are the
/// messages sent to clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Invalid access key")]
    InvalidAccessKey,

    #[error("Invalid parameters")]
    InvalidParameters,

    #[error("Invalid port range (1-65535)")]
    InvalidPortRange,

    #[error("Port range too large (max 10000)")]
    RangeTooLarge,
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::InvalidAccessKey => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

/// Session-level failures. Per-port probe failures never become one of these.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("all scan workers exited with {remaining} ports still queued")]
    WorkersExited { remaining: u64 },

    #[error("scan cancelled")]
    Cancelled,
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Everything the batch endpoint can answer with instead of a report.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Request(e) => e.into_response(),
            ApiError::Scan(e) => e.into_response(),
        }
    }
}
