//! Health check endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::warn;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Ready once the image builder answers.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let orchestrator = &state.orchestrator;
    let builder = orchestrator.builder();

    match builder.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "builder": builder.name(),
                "active_builds": orchestrator.active_builds(),
            })),
        ),
        Err(e) => {
            warn!(builder = builder.name(), error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "builder": builder.name(),
                    "error": e.to_string(),
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::routes::router;
    use crate::testing::{StubBuilder, StubFetcher, app_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn get(builder: StubBuilder, uri: &str) -> (StatusCode, Value) {
        let work_dir = tempfile::tempdir().unwrap();
        let state = app_state(StubFetcher::complete(), builder, work_dir.path());
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get(StubBuilder::default(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready() {
        let (status, body) = get(StubBuilder::default(), "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["active_builds"], 0);
    }

    #[tokio::test]
    async fn test_not_ready_without_builder() {
        let builder = StubBuilder {
            unhealthy: true,
            ..Default::default()
        };
        let (status, body) = get(builder, "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unavailable");
        assert!(body["error"].as_str().unwrap().contains("docker unavailable"));
    }
}
