//! Process-wide resolver cache, keyed by (resolver name, bound parameter
//! values), bounded with oldest-first eviction (§4.4).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub type Row = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    resolver: String,
    params: Vec<String>,
}

struct CacheEntry {
    row: Row,
    expires_at: Instant,
}

struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    order: VecDeque<CacheKey>,
    max_entries: usize,
    hits: u64,
    misses: u64,
}

pub struct ResolverCache {
    inner: Mutex<Inner>,
}

impl ResolverCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                max_entries,
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn get(&self, resolver: &str, params: &[String], now: Instant) -> Option<Row> {
        let key = CacheKey {
            resolver: resolver.to_string(),
            params: params.to_vec(),
        };
        let mut inner = self.inner.lock().unwrap();
        let hit = match inner.entries.get(&key) {
            Some(entry) if entry.expires_at > now => Some(entry.row.clone()),
            _ => None,
        };
        if hit.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        hit
    }

    pub fn put(&self, resolver: &str, params: Vec<String>, row: Row, ttl: Duration, now: Instant) {
        let key = CacheKey {
            resolver: resolver.to_string(),
            params,
        };
        let mut inner = self.inner.lock().unwrap();
        if !inner.entries.contains_key(&key) {
            inner.order.push_back(key.clone());
        }
        inner.entries.insert(
            key,
            CacheEntry {
                row,
                expires_at: now + ttl,
            },
        );
        while inner.entries.len() > inner.max_entries {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    pub fn stats(&self) -> (u64, u64, usize) {
        let inner = self.inner.lock().unwrap();
        (inner.hits, inner.misses, inner.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn miss_then_hit() {
        let cache = ResolverCache::new(10);
        let now = Instant::now();
        assert!(cache.get("r", &["acme".into()], now).is_none());
        cache.put("r", vec!["acme".into()], row(&[("tenant_id", "acme")]), Duration::from_secs(60), now);
        let got = cache.get("r", &["acme".into()], now).unwrap();
        assert_eq!(got.get("tenant_id").unwrap(), "acme");
        let (hits, misses, size) = cache.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
        assert_eq!(size, 1);
    }

    #[test]
    fn entry_expires() {
        let cache = ResolverCache::new(10);
        let now = Instant::now();
        cache.put("r", vec!["acme".into()], row(&[("x", "1")]), Duration::from_secs(1), now);
        let later = now + Duration::from_secs(2);
        assert!(cache.get("r", &["acme".into()], later).is_none());
    }

    #[test]
    fn oldest_first_eviction_at_capacity() {
        let cache = ResolverCache::new(2);
        let now = Instant::now();
        cache.put("r", vec!["a".into()], row(&[]), Duration::from_secs(60), now);
        cache.put("r", vec!["b".into()], row(&[]), Duration::from_secs(60), now);
        cache.put("r", vec!["c".into()], row(&[]), Duration::from_secs(60), now);
        assert!(cache.get("r", &["a".into()], now).is_none());
        assert!(cache.get("r", &["c".into()], now).is_some());
    }

    #[test]
    fn different_params_are_different_keys() {
        let cache = ResolverCache::new(10);
        let now = Instant::now();
        cache.put("r", vec!["a".into()], row(&[("v", "1")]), Duration::from_secs(60), now);
        cache.put("r", vec!["b".into()], row(&[("v", "2")]), Duration::from_secs(60), now);
        assert_eq!(cache.get("r", &["a".into()], now).unwrap().get("v").unwrap(), "1");
        assert_eq!(cache.get("r", &["b".into()], now).unwrap().get("v").unwrap(), "2");
    }
}
