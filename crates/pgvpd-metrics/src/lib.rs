//! pgvpd observability (§4.7).
//!
//! Holds the handful of truly process-global counters (connection totals)
//! and the Prometheus text renderer. Pool, resolver, and tenant state are
//! owned by their respective crates; `pgvpd-admin` assembles a
//! [`snapshot::Snapshot`] from all of them at read time.

pub mod counters;
pub mod prometheus;
pub mod snapshot;

pub use counters::Metrics;
pub use prometheus::render;
pub use snapshot::{PoolBucketSnapshot, ResolverSnapshot, Snapshot, TenantRejectedSnapshot};
