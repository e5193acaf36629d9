use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PoolMetrics {
    pub checkouts_total: AtomicU64,
    pub reuses_total: AtomicU64,
    pub creates_total: AtomicU64,
    pub checkins_total: AtomicU64,
    pub discards_total: AtomicU64,
    pub timeouts_total: AtomicU64,
}

impl PoolMetrics {
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
