use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::bucket::Bucket;
use crate::error::{PoolError, PoolResult};
use crate::factory::ConnectionFactory;
use crate::metrics::PoolMetrics;
use crate::types::{Checkout, PoolConfig, PoolKey, PooledConn};

/// A mapping from bucket key to bucket, with process-wide config, a shared
/// factory, and shared metrics (§4.5).
pub struct PoolManager<C> {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory<C>>,
    buckets: RwLock<HashMap<PoolKey, Arc<Bucket<C>>>>,
    pub metrics: Arc<PoolMetrics>,
}

impl<C: Send + 'static> PoolManager<C> {
    pub fn new(config: PoolConfig, factory: Arc<dyn ConnectionFactory<C>>) -> Self {
        Self {
            config,
            factory,
            buckets: RwLock::new(HashMap::new()),
            metrics: Arc::new(PoolMetrics::default()),
        }
    }

    async fn bucket_for(&self, key: &PoolKey) -> Arc<Bucket<C>> {
        if let Some(bucket) = self.buckets.read().await.get(key) {
            return Arc::clone(bucket);
        }
        let mut buckets = self.buckets.write().await;
        Arc::clone(
            buckets
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Bucket::new())),
        )
    }

    /// §4.5 "Checkout": reuse an idle connection, else create one under
    /// capacity, else wait up to `pool_checkout_timeout`.
    pub async fn checkout(&self, key: &PoolKey) -> PoolResult<Checkout<C>> {
        PoolMetrics::inc(&self.metrics.checkouts_total);
        let bucket = self.bucket_for(key).await;
        let deadline = Instant::now() + self.config.checkout_timeout;

        loop {
            if let Some(pooled) = bucket.idle.lock().await.pop_front() {
                PoolMetrics::inc(&self.metrics.reuses_total);
                return Ok(Checkout { pooled, reused: true });
            }

            if bucket.live.load(Ordering::SeqCst) < self.config.max_size {
                bucket.live.fetch_add(1, Ordering::SeqCst);
                match self.factory.connect(key).await {
                    Ok((conn, meta)) => {
                        PoolMetrics::inc(&self.metrics.creates_total);
                        return Ok(Checkout {
                            pooled: PooledConn { conn, meta },
                            reused: false,
                        });
                    }
                    Err(e) => {
                        bucket.live.fetch_sub(1, Ordering::SeqCst);
                        bucket.notify.notify_one();
                        return Err(e);
                    }
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                PoolMetrics::inc(&self.metrics.timeouts_total);
                return Err(PoolError::CheckoutTimeout(self.config.checkout_timeout));
            }
            if timeout(remaining, bucket.notify.notified()).await.is_err() {
                PoolMetrics::inc(&self.metrics.timeouts_total);
                return Err(PoolError::CheckoutTimeout(self.config.checkout_timeout));
            }
        }
    }

    /// §4.5 "Checkin": the caller has already run the CLEANUP sequence on
    /// `conn` (ROLLBACK; DISCARD ALL) — this just records the outcome.
    pub async fn checkin(&self, key: &PoolKey, mut pooled: PooledConn<C>, healthy: bool) {
        PoolMetrics::inc(&self.metrics.checkins_total);
        let bucket = self.bucket_for(key).await;
        if healthy {
            pooled.meta.last_used = Instant::now();
            bucket.idle.lock().await.push_back(pooled);
            bucket.notify.notify_one();
        } else {
            PoolMetrics::inc(&self.metrics.discards_total);
            bucket.live.fetch_sub(1, Ordering::SeqCst);
            bucket.notify.notify_one();
            drop(pooled);
        }
    }

    /// §4.5 "Idle reaper": close connections idle past `pool_idle_timeout`.
    /// Bucket locks are held only to collect expired entries; the
    /// connections themselves are dropped after the lock is released.
    pub async fn reap_idle(&self) {
        let now = Instant::now();
        let buckets: Vec<(PoolKey, Arc<Bucket<C>>)> = self
            .buckets
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();

        for (key, bucket) in buckets {
            let mut expired = Vec::new();
            {
                let mut idle = bucket.idle.lock().await;
                let mut i = 0;
                while i < idle.len() {
                    let too_old = now.duration_since(idle[i].meta.last_used) > self.config.idle_timeout;
                    if too_old {
                        expired.push(idle.remove(i).unwrap());
                    } else {
                        i += 1;
                    }
                }
            }
            if !expired.is_empty() {
                bucket.live.fetch_sub(expired.len() as u32, Ordering::SeqCst);
                tracing::debug!(database = %key.database, role = %key.effective_role, reaped = expired.len(), "idle connections reaped");
            }
            drop(expired);
        }
    }

    /// Close every idle connection across every bucket — used on graceful
    /// shutdown (§5 "Cancellation").
    pub async fn drain(&self) {
        let buckets: Vec<Arc<Bucket<C>>> = self.buckets.read().await.values().cloned().collect();
        for bucket in buckets {
            let mut idle = bucket.idle.lock().await;
            let drained = idle.len();
            idle.clear();
            bucket.live.fetch_sub(drained as u32, Ordering::SeqCst);
        }
    }

    pub async fn status(&self) -> HashMap<PoolKey, (u32, usize)> {
        let buckets = self.buckets.read().await;
        let mut out = HashMap::with_capacity(buckets.len());
        for (key, bucket) in buckets.iter() {
            out.insert(key.clone(), (bucket.live_count(), bucket.idle_count().await));
        }
        out
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

/// Spawn the background idle reaper, running every
/// `max(pool_idle_timeout / 2, 5s)` (§4.5), until `shutdown` fires.
pub fn spawn_idle_reaper<C: Send + Sync + 'static>(
    manager: Arc<PoolManager<C>>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let interval = std::cmp::max(manager.config().idle_timeout / 2, Duration::from_secs(5));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => manager.reap_idle().await,
                _ = shutdown.changed() => break,
            }
        }
    })
}
