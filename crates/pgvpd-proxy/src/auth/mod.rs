//! Upstream authentication (§9 "SCRAM relay").
//!
//! In passthrough mode the handler never parses auth bodies at all — it
//! relays raw frames until `AuthenticationOk`. This module is only used in
//! pool mode, where pgvpd itself authenticates to the upstream as the login
//! role using `upstream_password`.

pub mod scram;

use pgvpd_wire::AuthMessage;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("server requested unsupported authentication method: {0:?}")]
    Unsupported(AuthMessage),
    #[error("scram: {0}")]
    Scram(#[from] scram::ScramError),
}
