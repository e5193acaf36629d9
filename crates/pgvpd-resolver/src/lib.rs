//! Resolver DAG ordering and TTL cache (§4.4).
//!
//! This crate owns the static shape of the resolver pipeline (dependency
//! ordering, computed once at startup) and the process-wide cache. Query
//! execution against a live upstream connection, and the session-variable
//! substitution that happens around it, belong to `pgvpd-proxy` — this
//! crate has no notion of a connection.

pub mod cache;
pub mod def;
pub mod error;
pub mod metrics;
pub mod topo;

pub use cache::ResolverCache;
pub use def::ResolverDef;
pub use error::{ResolverError, ResolverResult};
pub use metrics::ResolverMetrics;

/// A resolver pipeline: definitions in topological order plus the shared
/// cache they read and write.
pub struct ResolverEngine {
    ordered: Vec<ResolverDef>,
    cache: ResolverCache,
    pub metrics: ResolverMetrics,
}

impl ResolverEngine {
    pub fn new(defs: Vec<ResolverDef>, cache_capacity: usize) -> ResolverResult<Self> {
        let ordered = topo::sort(defs)?;
        Ok(Self {
            ordered,
            cache: ResolverCache::new(cache_capacity),
            metrics: ResolverMetrics::default(),
        })
    }

    /// Resolvers in the order they must run: producers before consumers.
    pub fn ordered(&self) -> &[ResolverDef] {
        &self.ordered
    }

    pub fn cache(&self) -> &ResolverCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_orders_and_exposes_cache() {
        let defs = vec![
            ResolverDef {
                name: "child".into(),
                sql: "select 1".into(),
                params: vec![],
                injects: vec![],
                required: true,
                unique: false,
                cache_ttl_secs: None,
                depends_on: vec!["parent".into()],
            },
            ResolverDef {
                name: "parent".into(),
                sql: "select 1".into(),
                params: vec![],
                injects: vec![],
                required: true,
                unique: false,
                cache_ttl_secs: None,
                depends_on: vec![],
            },
        ];
        let engine = ResolverEngine::new(defs, 1000).unwrap();
        let names: Vec<_> = engine.ordered().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["parent", "child"]);
        assert_eq!(engine.cache().stats(), (0, 0, 0));
    }
}
