//! Admin HTTP surface regression tests.
//!
//! Validates that the routes the daemon wires up at startup behave
//! correctly against a fixed snapshot, without needing a live proxy.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pgvpd_admin::{build_router, SnapshotFuture, SnapshotSource};
use pgvpd_metrics::{PoolBucketSnapshot, Snapshot};
use tower::ServiceExt;

struct FixedSource(Snapshot);

impl SnapshotSource for FixedSource {
    fn snapshot<'a>(&'a self) -> SnapshotFuture<'a> {
        let snapshot = self.0.clone();
        Box::pin(async move { snapshot })
    }
}

fn sample_snapshot() -> Snapshot {
    Snapshot {
        connections_total: 12,
        connections_active: 4,
        pool_checkouts_total: 9,
        pool_reuses_total: 5,
        pool_buckets: vec![PoolBucketSnapshot {
            database: "acme".into(),
            effective_role: "app_user".into(),
            total: 2,
            idle: 1,
        }],
        ..Default::default()
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let router = build_router(Arc::new(FixedSource(sample_snapshot())));
    let resp = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_reflects_pool_bucket_state() {
    let router = build_router(Arc::new(FixedSource(sample_snapshot())));
    let resp = router
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["connections_active"], 4);
    assert_eq!(json["pool_buckets"][0]["database"], "acme");
}

#[tokio::test]
async fn metrics_exposes_prometheus_counters() {
    let router = build_router(Arc::new(FixedSource(sample_snapshot())));
    let resp = router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("pgvpd_connections_total 12"));
    assert!(text.contains("pgvpd_pool_checkouts_total 9"));
}
