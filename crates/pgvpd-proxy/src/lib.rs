//! pgvpd proxy — the stream abstraction, upstream/client authentication,
//! the per-connection state machine, and the accept loop that dispatches
//! into it.
//!
//! # Components
//!
//! - **`listener`** — plain + optional TLS accept loops, one task per connection
//! - **`handler`** — the `WAIT_STARTUP` → ... → `CLEANUP` state machine
//! - **`factory`** — pool-mode upstream connections (`ConnectionFactory` impl)
//! - **`identity`** — parsing the multiplexed `user` field into role + context
//! - **`auth`** — SCRAM-SHA-256 client, used only for pool-mode upstream auth
//! - **`stream`** — the plain/TLS transport enums shared by client and upstream
//! - **`tls`** — certificate loading and TLS acceptor/connector construction
//! - **`error`** — the client-observable error taxonomy
//! - **`framed_io`** — pulling complete wire frames off an `AsyncRead`

pub mod auth;
pub mod error;
pub mod factory;
pub mod framed_io;
pub mod handler;
pub mod identity;
pub mod listener;
pub mod stream;
pub mod tls;

pub use error::HandlerError;
pub use factory::{PgConnectionFactory, UpstreamConn};
pub use handler::{handle, Shared};
pub use identity::{parse_identity, Identity, IdentityError};
pub use stream::{ClientTransport, UpstreamTransport};
pub use tls::UpstreamTls;
