use thiserror::Error;

pub type ResolverResult<T> = Result<T, ResolverError>;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("resolver dependency cycle detected among: {0:?}")]
    Cycle(Vec<String>),

    #[error("resolver {0:?} depends on unknown resolver {1:?}")]
    UnknownDependency(String, String),

    #[error("duplicate resolver name {0:?}")]
    DuplicateName(String),
}
