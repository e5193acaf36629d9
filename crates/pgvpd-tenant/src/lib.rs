//! Per-tenant admission control: allow/deny lists, a fixed-window rate
//! limiter, and a max-concurrency gate, with guaranteed guard release
//! (§4.6).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Why `admit` refused a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Deny,
    Rate,
    Limit,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Deny => "denied",
            RejectReason::Rate => "rate limit",
            RejectReason::Limit => "connection limit",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TenantConfig {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub max_connections: Option<u32>,
    pub rate_limit: Option<u32>,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
            max_connections: None,
            rate_limit: None,
        }
    }
}

struct RateWindow {
    start: Instant,
    count: u32,
}

struct TenantEntry {
    active: AtomicU32,
    admitted_total: AtomicU64,
    window: Mutex<RateWindow>,
}

impl TenantEntry {
    fn new(now: Instant) -> Self {
        Self {
            active: AtomicU32::new(0),
            admitted_total: AtomicU64::new(0),
            window: Mutex::new(RateWindow { start: now, count: 0 }),
        }
    }
}

/// A scoped admission slot. Decrements the tenant's active count exactly
/// once, on drop, regardless of how the holding connection exits.
pub struct TenantGuard {
    tenant: String,
    entry: Arc<TenantEntry>,
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        self.entry.active.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(tenant = %self.tenant, "tenant guard released");
    }
}

impl TenantGuard {
    pub fn tenant(&self) -> &str {
        &self.tenant
    }
}

#[derive(Debug, Default, Clone)]
pub struct TenantSnapshot {
    pub active: u32,
    pub admitted_total: u64,
}

/// Rejection counters, one per `RejectReason`, plus a timeout counter for
/// tenants that give up waiting on an accept-path timer elsewhere.
#[derive(Debug, Default)]
pub struct TenantMetrics {
    pub rejected_deny: AtomicU64,
    pub rejected_rate: AtomicU64,
    pub rejected_limit: AtomicU64,
    pub timeouts: AtomicU64,
}

impl TenantMetrics {
    fn record(&self, reason: RejectReason) {
        let counter = match reason {
            RejectReason::Deny => &self.rejected_deny,
            RejectReason::Rate => &self.rejected_rate,
            RejectReason::Limit => &self.rejected_limit,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

const RATE_WINDOW: Duration = Duration::from_secs(1);

pub struct TenantRegistry {
    config: TenantConfig,
    entries: RwLock<HashMap<String, Arc<TenantEntry>>>,
    pub metrics: Arc<TenantMetrics>,
}

impl TenantRegistry {
    pub fn new(config: TenantConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            metrics: Arc::new(TenantMetrics::default()),
        }
    }

    fn entry_for(&self, tenant: &str, now: Instant) -> Arc<TenantEntry> {
        if let Some(entry) = self.entries.read().unwrap().get(tenant) {
            return Arc::clone(entry);
        }
        let mut entries = self.entries.write().unwrap();
        Arc::clone(
            entries
                .entry(tenant.to_string())
                .or_insert_with(|| Arc::new(TenantEntry::new(now))),
        )
    }

    /// §4.6: deny/allow check, rate window, max-concurrency, in that order.
    pub fn admit(&self, tenant: &str, now: Instant) -> Result<TenantGuard, RejectReason> {
        if self.config.deny.iter().any(|t| t == tenant) {
            self.metrics.record(RejectReason::Deny);
            return Err(RejectReason::Deny);
        }
        if !self.config.allow.is_empty() && !self.config.allow.iter().any(|t| t == tenant) {
            self.metrics.record(RejectReason::Deny);
            return Err(RejectReason::Deny);
        }

        let entry = self.entry_for(tenant, now);

        // Rate check, limit check and the active-count increment all happen
        // under this one lock so two concurrent admits on the same tenant
        // can't both observe room under `max_connections` and both proceed.
        let mut window = entry.window.lock().unwrap();

        if let Some(limit) = self.config.rate_limit {
            if now.duration_since(window.start) >= RATE_WINDOW {
                window.start = now;
                window.count = 0;
            }
            window.count += 1;
            if window.count > limit {
                drop(window);
                self.metrics.record(RejectReason::Rate);
                return Err(RejectReason::Rate);
            }
        }

        if let Some(max) = self.config.max_connections {
            if entry.active.load(Ordering::SeqCst) >= max {
                drop(window);
                self.metrics.record(RejectReason::Limit);
                return Err(RejectReason::Limit);
            }
        }

        entry.active.fetch_add(1, Ordering::SeqCst);
        entry.admitted_total.fetch_add(1, Ordering::Relaxed);
        drop(window);
        tracing::debug!(tenant = %tenant, "tenant admitted");
        Ok(TenantGuard {
            tenant: tenant.to_string(),
            entry,
        })
    }

    pub fn snapshot(&self, tenant: &str) -> Option<TenantSnapshot> {
        self.entries.read().unwrap().get(tenant).map(|e| TenantSnapshot {
            active: e.active.load(Ordering::SeqCst),
            admitted_total: e.admitted_total.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_listed_tenant() {
        let registry = TenantRegistry::new(TenantConfig {
            deny: vec!["acme".into()],
            ..Default::default()
        });
        let err = registry.admit("acme", Instant::now()).unwrap_err();
        assert_eq!(err, RejectReason::Deny);
    }

    #[test]
    fn allow_list_excludes_unlisted_tenant() {
        let registry = TenantRegistry::new(TenantConfig {
            allow: vec!["acme".into()],
            ..Default::default()
        });
        assert!(registry.admit("acme", Instant::now()).is_ok());
        assert_eq!(
            registry.admit("other", Instant::now()).unwrap_err(),
            RejectReason::Deny
        );
    }

    #[test]
    fn rate_limit_rejects_after_threshold_within_window() {
        let registry = TenantRegistry::new(TenantConfig {
            rate_limit: Some(2),
            ..Default::default()
        });
        let now = Instant::now();
        let g1 = registry.admit("acme", now).unwrap();
        let g2 = registry.admit("acme", now).unwrap();
        let err = registry.admit("acme", now).unwrap_err();
        assert_eq!(err, RejectReason::Rate);
        drop(g1);
        drop(g2);
    }

    #[test]
    fn rate_window_resets_after_one_second() {
        let registry = TenantRegistry::new(TenantConfig {
            rate_limit: Some(1),
            ..Default::default()
        });
        let now = Instant::now();
        let g1 = registry.admit("acme", now).unwrap();
        assert_eq!(registry.admit("acme", now).unwrap_err(), RejectReason::Rate);
        let later = now + Duration::from_secs(2);
        assert!(registry.admit("acme", later).is_ok());
        drop(g1);
    }

    #[test]
    fn max_connections_gate() {
        let registry = TenantRegistry::new(TenantConfig {
            max_connections: Some(1),
            ..Default::default()
        });
        let now = Instant::now();
        let g1 = registry.admit("acme", now).unwrap();
        assert_eq!(
            registry.admit("acme", now).unwrap_err(),
            RejectReason::Limit
        );
        drop(g1);
        assert!(registry.admit("acme", now).is_ok());
    }

    #[test]
    fn guard_release_decrements_active_exactly_once() {
        let registry = TenantRegistry::new(TenantConfig::default());
        let now = Instant::now();
        let guard = registry.admit("acme", now).unwrap();
        assert_eq!(registry.snapshot("acme").unwrap().active, 1);
        drop(guard);
        assert_eq!(registry.snapshot("acme").unwrap().active, 0);
    }

    #[test]
    fn unconfigured_limits_never_reject() {
        let registry = TenantRegistry::new(TenantConfig::default());
        let now = Instant::now();
        for _ in 0..50 {
            std::mem::forget(registry.admit("acme", now).unwrap());
        }
    }
}
