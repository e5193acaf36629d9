use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::{Mutex, Notify};

use crate::types::PooledConn;

/// One (database, effective role) partition: an idle queue plus a live
/// count and a wakeup signal for waiting checkouts (§3 "Pool bucket").
pub struct Bucket<C> {
    pub(crate) idle: Mutex<VecDeque<PooledConn<C>>>,
    pub(crate) live: AtomicU32,
    pub(crate) notify: Notify,
}

impl<C> Bucket<C> {
    pub fn new() -> Self {
        Self {
            idle: Mutex::new(VecDeque::new()),
            live: AtomicU32::new(0),
            notify: Notify::new(),
        }
    }

    pub fn live_count(&self) -> u32 {
        self.live.load(Ordering::SeqCst)
    }

    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }
}

impl<C> Default for Bucket<C> {
    fn default() -> Self {
        Self::new()
    }
}
