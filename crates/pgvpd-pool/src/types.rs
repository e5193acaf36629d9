//! Pool key, config, and per-connection metadata (§3 "Pool bucket",
//! "Pooled connection").

use std::time::{Duration, Instant};

use bytes::Bytes;

/// Buckets partition the pool by (database, effective role) — connections
/// in different buckets are never interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub database: String,
    pub effective_role: String,
}

impl PoolKey {
    pub fn new(database: impl Into<String>, effective_role: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            effective_role: effective_role.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: u32,
    pub checkout_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            checkout_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Metadata captured at authentication time and replayed to new clients on
/// every subsequent checkout (§4.5 "Synthesized client handshake").
#[derive(Debug, Clone)]
pub struct ConnMeta {
    pub backend_key_data: Bytes,
    pub parameter_status: Vec<Bytes>,
    pub last_used: Instant,
}

/// A connection bundled with the metadata the handler needs to replay a
/// client handshake without re-authenticating upstream.
pub struct PooledConn<C> {
    pub conn: C,
    pub meta: ConnMeta,
}

/// The result of a checkout: the connection plus whether it was reused from
/// the idle queue or freshly created.
pub struct Checkout<C> {
    pub pooled: PooledConn<C>,
    pub reused: bool,
}
