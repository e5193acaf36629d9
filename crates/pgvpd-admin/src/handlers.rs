use std::collections::HashMap;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::AdminState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics(State(state): State<AdminState>) -> impl IntoResponse {
    let snapshot = state.source.snapshot().await;
    let body = pgvpd_metrics::render(&snapshot);
    ([("content-type", "text/plain; version=0.0.4")], body)
}

#[derive(Serialize)]
struct PoolBucketStatus {
    total: u32,
    idle: usize,
}

#[derive(Serialize)]
struct ResolverStatus {
    executions_total: u64,
    errors_total: u64,
}

#[derive(Serialize)]
struct StatusResponse {
    connections_total: u64,
    connections_active: u64,
    pool: HashMap<String, PoolBucketStatus>,
    resolvers: HashMap<String, ResolverStatus>,
}

pub async fn status(State(state): State<AdminState>) -> impl IntoResponse {
    let snapshot = state.source.snapshot().await;

    let pool = snapshot
        .pool_buckets
        .iter()
        .map(|b| {
            (
                format!("{}/{}", b.database, b.effective_role),
                PoolBucketStatus {
                    total: b.total,
                    idle: b.idle,
                },
            )
        })
        .collect();

    let resolvers = snapshot
        .resolvers
        .iter()
        .map(|r| {
            (
                r.name.clone(),
                ResolverStatus {
                    executions_total: r.executions_total,
                    errors_total: r.errors_total,
                },
            )
        })
        .collect();

    Json(StatusResponse {
        connections_total: snapshot.connections_total,
        connections_active: snapshot.connections_active,
        pool,
        resolvers,
    })
}
