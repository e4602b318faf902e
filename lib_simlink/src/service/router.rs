//! Axum router for the snapshot endpoint.
//!
//! Every path is served by the same fallback handler, so `GET /`,
//! `GET /plane` and `GET /anything/else` all return the snapshot.

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tracing::trace;

use crate::core::query::{EmptyResponseShape, QueryResponse};
use crate::core::snapshot_store::SnapshotStore;

/// What the handler needs: the store to read and the empty-body policy.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub store: SnapshotStore,
    pub empty_shape: EmptyResponseShape,
}

impl QueryState {
    pub fn new(store: SnapshotStore, empty_shape: EmptyResponseShape) -> Self {
        Self { store, empty_shape }
    }
}

/// Builds the bridge router over `state`.
pub fn build_router(state: QueryState) -> Router {
    Router::new().fallback(snapshot).with_state(state)
}

async fn snapshot(method: Method, State(state): State<QueryState>) -> Response {
    if method != Method::GET {
        trace!(%method, "Rejecting request method");
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    Json(QueryResponse::from_store(&state.store, state.empty_shape)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{TelemetrySnapshot, Title};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_get_any_path_returns_json() {
        let router = build_router(QueryState::default());
        let response = router
            .oneshot(Request::get("/some/path").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap().to_str().unwrap();
        assert_eq!(content_type, "application/json");
        let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["Title"], "");
        assert!(json.get("timestamp").is_none());
    }

    #[tokio::test]
    async fn test_get_returns_latest_snapshot() {
        let state = QueryState::default();
        state.store.write(TelemetrySnapshot {
            title: Title::new("Piper PA-28"),
            latitude_deg: 51.47,
            longitude_deg: -0.45,
            altitude_ft: 83.0,
            heading_magnetic_deg: 270.0,
            airspeed_true_kts: 0.0,
            vertical_speed_fpm: 0.0,
        });

        let response = build_router(state)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["Title"], "Piper PA-28");
        assert_eq!(json["PlaneHeadingDegreesMagnetic"], 270.0);
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_other_methods_are_rejected_with_empty_body() {
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
            let response = build_router(QueryState::default())
                .oneshot(Request::builder().method(method.clone()).uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
            assert!(body_bytes(response).await.is_empty(), "{method}");
        }
    }
}
