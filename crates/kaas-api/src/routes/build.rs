//! Build endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use kaas_core::{BuildRequest, Error};
use serde::Serialize;
use serde_json::Value;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/build", post(build))
}

#[derive(Debug, Serialize)]
struct BuildResponse {
    image: String,
}

/// Run one build and answer with the image name.
///
/// The body is read as raw bytes so that anything other than a JSON object
/// is answered with the same `missing keys` error as an object without
/// `repo_url`.
async fn build(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BuildResponse>, ApiError> {
    let body: Value = serde_json::from_slice(&body).map_err(|_| Error::missing_keys())?;
    let request = BuildRequest::from_json(&body)?;

    let cancel = state.shutdown.child_token();
    // Dropped with the handler when the client disconnects.
    let _guard = cancel.clone().drop_guard();

    let image = state
        .orchestrator
        .spawn(request, cancel)
        .await
        .map_err(|e| ApiError::BuildFailed(format!("build task failed: {}", e)))??;

    Ok(Json(BuildResponse { image }))
}
