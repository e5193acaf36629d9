//! The binary's `SnapshotSource` impl: pulls live state out of the pool
//! manager, tenant registry, resolver engine, and metrics counters that
//! `pgvpd-admin` itself never depends on.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use pgvpd_admin::{SnapshotFuture, SnapshotSource};
use pgvpd_metrics::{Metrics, PoolBucketSnapshot, ResolverSnapshot, Snapshot, TenantRejectedSnapshot};
use pgvpd_pool::{PoolManager, PoolMetrics};
use pgvpd_proxy::factory::UpstreamConn;
use pgvpd_resolver::ResolverEngine;
use pgvpd_tenant::TenantRegistry;

pub struct AppSnapshotSource {
    pub metrics: Arc<Metrics>,
    pub tenant: Arc<TenantRegistry>,
    pub resolver: Arc<ResolverEngine>,
    pub pool: Option<Arc<PoolManager<UpstreamConn>>>,
}

impl SnapshotSource for AppSnapshotSource {
    fn snapshot<'a>(&'a self) -> SnapshotFuture<'a> {
        Box::pin(async move {
            let (connections_total, connections_active) = self.metrics.snapshot();

            let (cache_hits, cache_misses, _) = self.resolver.cache().stats();
            let resolvers = self
                .resolver
                .metrics
                .snapshot()
                .into_iter()
                .map(|(name, executions_total, errors_total)| ResolverSnapshot {
                    name,
                    executions_total,
                    errors_total,
                })
                .collect();

            let mut snapshot = Snapshot {
                connections_total,
                connections_active,
                resolver_cache_hits_total: cache_hits,
                resolver_cache_misses_total: cache_misses,
                resolvers,
                tenant_rejected: TenantRejectedSnapshot {
                    denied: self.tenant.metrics.rejected_deny.load(Ordering::Relaxed),
                    rate_limited: self.tenant.metrics.rejected_rate.load(Ordering::Relaxed),
                    connection_limited: self.tenant.metrics.rejected_limit.load(Ordering::Relaxed),
                },
                tenant_timeouts_total: self.tenant.metrics.timeouts.load(Ordering::Relaxed),
                ..Default::default()
            };

            if let Some(pool) = &self.pool {
                snapshot.pool_checkouts_total = PoolMetrics::get(&pool.metrics.checkouts_total);
                snapshot.pool_reuses_total = PoolMetrics::get(&pool.metrics.reuses_total);
                snapshot.pool_creates_total = PoolMetrics::get(&pool.metrics.creates_total);
                snapshot.pool_checkins_total = PoolMetrics::get(&pool.metrics.checkins_total);
                snapshot.pool_discards_total = PoolMetrics::get(&pool.metrics.discards_total);
                snapshot.pool_timeouts_total = PoolMetrics::get(&pool.metrics.timeouts_total);
                snapshot.pool_buckets = pool
                    .status()
                    .await
                    .into_iter()
                    .map(|(key, (live, idle))| PoolBucketSnapshot {
                        database: key.database,
                        effective_role: key.effective_role,
                        total: live,
                        idle,
                    })
                    .collect();
            }

            snapshot
        })
    }
}
