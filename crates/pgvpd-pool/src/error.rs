use thiserror::Error;

pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool checkout timed out after {0:?}")]
    CheckoutTimeout(std::time::Duration),

    #[error("failed to connect to upstream: {0}")]
    Connect(String),
}
