//! The error taxonomy observable by the client (§7).
//!
//! Every variant maps to at most one `ErrorResponse` frame sent to the
//! client before the socket closes — the "single-error gate" invariant
//! (§9): the handler's top level catches every fallible step and emits the
//! frame exactly once.

use pgvpd_pool::PoolError;
use pgvpd_resolver::ResolverError;
use pgvpd_tenant::RejectReason;
use pgvpd_wire::WireError;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("no valid user")]
    NoValidUser,
    #[error("malformed identity: {0}")]
    MalformedIdentity(String),
    #[error("tenant rejected: {0:?}")]
    TenantRejected(RejectReason),
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("pool exhausted: {0}")]
    PoolExhausted(#[from] PoolError),
    #[error("required resolver {0} failed")]
    ResolverRequired(String),
    #[error("resolver engine error: {0}")]
    Resolver(#[from] ResolverError),
    #[error("injection failed")]
    InjectionFailed,
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),
    #[error("transport closed")]
    TransportClosed,
    #[error("tenant query inactivity timeout")]
    InactivityTimeout,
}

/// SQLSTATE and message pair per §7, for the `ErrorResponse` the handler
/// sends to the client. `None` means "close silently, no synthesized
/// error" (transport failures, and anything already in `PIPE`).
impl HandlerError {
    pub fn client_facing(&self) -> Option<(&'static str, String)> {
        match self {
            HandlerError::NoValidUser => Some(("08004", "no valid user".to_string())),
            HandlerError::MalformedIdentity(msg) => Some(("28000", msg.clone())),
            HandlerError::TenantRejected(reason) => {
                let msg = match reason {
                    RejectReason::Deny => "denied",
                    RejectReason::Rate => "rate limit",
                    RejectReason::Limit => "connection limit",
                };
                Some(("28000", msg.to_string()))
            }
            HandlerError::HandshakeTimeout => Some(("57014", "handshake timed out".to_string())),
            HandlerError::PoolExhausted(_) => Some(("53300", "too many connections".to_string())),
            HandlerError::ResolverRequired(name) => {
                Some(("28000", format!("required resolver '{name}' failed")))
            }
            HandlerError::Resolver(_) => None,
            HandlerError::InjectionFailed => None,
            HandlerError::Wire(_) => None,
            HandlerError::TransportClosed => None,
            HandlerError::InactivityTimeout => None,
        }
    }
}
