//! The admin surface is read-only over process state it doesn't own
//! (§4.7). `SnapshotSource` is the seam: the binary crate implements it by
//! pulling live state out of the pool manager, tenant registry, resolver
//! engine, and metrics counters, without this crate depending on any of
//! their concrete types.

use std::future::Future;
use std::pin::Pin;

use pgvpd_metrics::Snapshot;

pub type SnapshotFuture<'a> = Pin<Box<dyn Future<Output = Snapshot> + Send + 'a>>;

pub trait SnapshotSource: Send + Sync {
    fn snapshot<'a>(&'a self) -> SnapshotFuture<'a>;
}
