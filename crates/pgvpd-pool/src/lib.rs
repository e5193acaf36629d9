//! Session-mode connection pool, bucketed by (database, effective role)
//! (§4.5). Generic over the connection type `C` so this crate never needs
//! to know about TCP, TLS, or the wire protocol — `pgvpd-proxy` supplies
//! both `C` and the `ConnectionFactory` that creates it.

pub mod bucket;
pub mod error;
pub mod factory;
pub mod manager;
pub mod metrics;
pub mod types;

pub use error::{PoolError, PoolResult};
pub use factory::{ConnectFuture, ConnectionFactory};
pub use manager::{spawn_idle_reaper, PoolManager};
pub use metrics::PoolMetrics;
pub use types::{Checkout, ConnMeta, PoolConfig, PoolKey, PooledConn};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Debug)]
    struct MockConn(u32);

    struct CountingFactory {
        next_id: AtomicU32,
    }

    impl ConnectionFactory<MockConn> for CountingFactory {
        fn connect<'a>(&'a self, _key: &'a PoolKey) -> ConnectFuture<'a, MockConn> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Ok((
                    MockConn(id),
                    ConnMeta {
                        backend_key_data: bytes::Bytes::new(),
                        parameter_status: vec![],
                        last_used: Instant::now(),
                    },
                ))
            })
        }
    }

    fn manager(max_size: u32) -> PoolManager<MockConn> {
        let factory = std::sync::Arc::new(CountingFactory {
            next_id: AtomicU32::new(0),
        });
        PoolManager::new(
            PoolConfig {
                max_size,
                checkout_timeout: Duration::from_millis(50),
                idle_timeout: Duration::from_secs(300),
            },
            factory,
        )
    }

    #[tokio::test]
    async fn checkout_creates_new_connection_when_idle_empty() {
        let mgr = manager(2);
        let key = PoolKey::new("db", "app_user");
        let checkout = mgr.checkout(&key).await.unwrap();
        assert!(!checkout.reused);
        assert_eq!(PoolMetrics::get(&mgr.metrics.creates_total), 1);
    }

    #[tokio::test]
    async fn checkin_then_checkout_reuses_connection() {
        let mgr = manager(1);
        let key = PoolKey::new("db", "app_user");
        let checkout = mgr.checkout(&key).await.unwrap();
        mgr.checkin(&key, checkout.pooled, true).await;
        let checkout2 = mgr.checkout(&key).await.unwrap();
        assert!(checkout2.reused);
        assert_eq!(PoolMetrics::get(&mgr.metrics.creates_total), 1);
        assert_eq!(PoolMetrics::get(&mgr.metrics.reuses_total), 1);
    }

    #[tokio::test]
    async fn checkout_times_out_when_capacity_exhausted() {
        let mgr = manager(1);
        let key = PoolKey::new("db", "app_user");
        let _held = mgr.checkout(&key).await.unwrap();
        let result = mgr.checkout(&key).await;
        assert!(matches!(result, Err(PoolError::CheckoutTimeout(_))));
        assert_eq!(PoolMetrics::get(&mgr.metrics.timeouts_total), 1);
    }

    #[tokio::test]
    async fn unhealthy_checkin_discards_and_frees_capacity() {
        let mgr = manager(1);
        let key = PoolKey::new("db", "app_user");
        let checkout = mgr.checkout(&key).await.unwrap();
        mgr.checkin(&key, checkout.pooled, false).await;
        assert_eq!(PoolMetrics::get(&mgr.metrics.discards_total), 1);
        let checkout2 = mgr.checkout(&key).await.unwrap();
        assert!(!checkout2.reused);
        assert_eq!(PoolMetrics::get(&mgr.metrics.creates_total), 2);
    }

    #[tokio::test]
    async fn different_buckets_are_independent() {
        let mgr = manager(1);
        let a = mgr.checkout(&PoolKey::new("db", "role_a")).await.unwrap();
        let b = mgr.checkout(&PoolKey::new("db", "role_b")).await.unwrap();
        assert!(!a.reused && !b.reused);
    }

    #[tokio::test]
    async fn reap_idle_closes_stale_connections() {
        let mgr = manager(2);
        let key = PoolKey::new("db", "app_user");
        let checkout = mgr.checkout(&key).await.unwrap();
        let mut pooled = checkout.pooled;
        pooled.meta.last_used = Instant::now() - Duration::from_secs(3600);
        mgr.checkin(&key, pooled, true).await;

        mgr.reap_idle().await;

        let status = mgr.status().await;
        let (live, idle) = status.get(&key).unwrap();
        assert_eq!(*live, 0);
        assert_eq!(*idle, 0);
    }
}
