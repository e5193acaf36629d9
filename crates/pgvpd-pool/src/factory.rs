//! Connection factory — injected so the pool can be tested without a real
//! socket, following the same shape as `warpgrid-host`'s async connection
//! factory.

use std::future::Future;
use std::pin::Pin;

use crate::error::PoolResult;
use crate::types::{ConnMeta, PoolKey};

pub type ConnectFuture<'a, C> = Pin<Box<dyn Future<Output = PoolResult<(C, ConnMeta)>> + Send + 'a>>;

/// Establishes a brand-new, fully authenticated upstream connection for a
/// bucket. Implementations perform the full startup + auth handshake and
/// capture the `BackendKeyData`/`ParameterStatus` the server sent.
pub trait ConnectionFactory<C>: Send + Sync {
    fn connect<'a>(&'a self, key: &'a PoolKey) -> ConnectFuture<'a, C>;
}
