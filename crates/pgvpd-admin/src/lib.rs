//! pgvpd admin HTTP surface (§6 "Admin HTTP").
//!
//! A single plain HTTP/1.1 listener, three read-only routes: `/health`,
//! `/metrics` (Prometheus text), `/status` (JSON snapshot). No
//! authentication — expected to be bound to a private interface.

pub mod handlers;
pub mod source;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

pub use source::{SnapshotFuture, SnapshotSource};

#[derive(Clone)]
pub struct AdminState {
    pub source: Arc<dyn SnapshotSource>,
}

pub fn build_router(source: Arc<dyn SnapshotSource>) -> Router {
    let state = AdminState { source };
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/status", get(handlers::status))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use pgvpd_metrics::Snapshot;
    use tower::ServiceExt;

    struct FixedSource;

    impl SnapshotSource for FixedSource {
        fn snapshot<'a>(&'a self) -> SnapshotFuture<'a> {
            Box::pin(async {
                Snapshot {
                    connections_total: 3,
                    connections_active: 1,
                    ..Default::default()
                }
            })
        }
    }

    #[tokio::test]
    async fn health_returns_ok_json() {
        let app = build_router(Arc::new(FixedSource));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn metrics_renders_prometheus_text() {
        let app = build_router(Arc::new(FixedSource));
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("pgvpd_connections_total 3"));
    }

    #[tokio::test]
    async fn status_renders_json_snapshot() {
        let app = build_router(Arc::new(FixedSource));
        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["connections_total"], 3);
        assert_eq!(json["connections_active"], 1);
    }
}
