use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Per-resolver execution/error counters (§4.7).
#[derive(Default)]
pub struct ResolverMetrics {
    executions: RwLock<HashMap<String, Arc<AtomicU64>>>,
    errors: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

fn counter_for(map: &RwLock<HashMap<String, Arc<AtomicU64>>>, name: &str) -> Arc<AtomicU64> {
    if let Some(c) = map.read().unwrap().get(name) {
        return Arc::clone(c);
    }
    let mut map = map.write().unwrap();
    Arc::clone(map.entry(name.to_string()).or_insert_with(|| Arc::new(AtomicU64::new(0))))
}

impl ResolverMetrics {
    pub fn record_execution(&self, name: &str) {
        counter_for(&self.executions, name).fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, name: &str) {
        counter_for(&self.errors, name).fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Vec<(String, u64, u64)> {
        let executions = self.executions.read().unwrap();
        let errors = self.errors.read().unwrap();
        let mut names: Vec<&String> = executions.keys().chain(errors.keys()).collect();
        names.sort();
        names.dedup();
        names
            .into_iter()
            .map(|name| {
                let exec = executions.get(name).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0);
                let err = errors.get(name).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0);
                (name.clone(), exec, err)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_executions_and_errors_independently() {
        let metrics = ResolverMetrics::default();
        metrics.record_execution("user_account");
        metrics.record_execution("user_account");
        metrics.record_error("user_account");
        metrics.record_execution("other");

        let snapshot = metrics.snapshot();
        let user_account = snapshot.iter().find(|(n, _, _)| n == "user_account").unwrap();
        assert_eq!(user_account.1, 2);
        assert_eq!(user_account.2, 1);
    }
}
