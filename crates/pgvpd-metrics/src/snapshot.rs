//! Plain-data snapshot assembled by the admin layer from every subsystem,
//! kept separate from the subsystems themselves so this crate stays
//! dependency-free of pool/tenant/resolver types.

#[derive(Debug, Clone, Default)]
pub struct PoolBucketSnapshot {
    pub database: String,
    pub effective_role: String,
    pub total: u32,
    pub idle: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ResolverSnapshot {
    pub name: String,
    pub executions_total: u64,
    pub errors_total: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TenantRejectedSnapshot {
    pub denied: u64,
    pub rate_limited: u64,
    pub connection_limited: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub connections_total: u64,
    pub connections_active: u64,

    pub pool_checkouts_total: u64,
    pub pool_reuses_total: u64,
    pub pool_creates_total: u64,
    pub pool_checkins_total: u64,
    pub pool_discards_total: u64,
    pub pool_timeouts_total: u64,
    pub pool_buckets: Vec<PoolBucketSnapshot>,

    pub resolver_cache_hits_total: u64,
    pub resolver_cache_misses_total: u64,
    pub resolvers: Vec<ResolverSnapshot>,

    pub tenant_rejected: TenantRejectedSnapshot,
    pub tenant_timeouts_total: u64,
}
