use std::sync::atomic::{AtomicU64, Ordering};

/// The genuinely process-global counters (§4.7) — everything else
/// (per-bucket pool state, per-resolver executions, per-tenant
/// rejections) is owned by the subsystem that produces it and folded into
/// a [`crate::snapshot::Snapshot`] by the admin HTTP layer at read time.
#[derive(Debug, Default)]
pub struct Metrics {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
}

impl Metrics {
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.connections_total.load(Ordering::Relaxed),
            self.connections_active.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_then_close_tracks_active_count() {
        let m = Metrics::default();
        m.connection_opened();
        m.connection_opened();
        assert_eq!(m.snapshot(), (2, 2));
        m.connection_closed();
        assert_eq!(m.snapshot(), (2, 1));
    }
}
