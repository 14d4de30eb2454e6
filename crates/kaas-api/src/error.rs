//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    /// The request could not be served as given.
    BadRequest(String),
    /// The build was attempted and failed.
    BuildFailed(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, format!("Bad request: {}", msg)),
            ApiError::BuildFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to build: {}", msg),
            ),
        };

        let body = Json(json!({
            "err": message
        }));

        (status, body).into_response()
    }
}

impl From<kaas_core::Error> for ApiError {
    fn from(err: kaas_core::Error) -> Self {
        if err.is_client_error() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::BuildFailed(err.to_string())
        }
    }
}
