//! PostgreSQL v3 wire protocol framing and message construction.
//!
//! This crate knows nothing about sockets, pools, or tenants — it only
//! turns bytes into frames and frames into bytes.

pub mod error;
pub mod escape;
pub mod frame;
pub mod message;
pub mod startup;

pub use error::{WireError, WireResult};
pub use frame::{MessageFramer, StartupFramer};
pub use message::{tag, AuthMessage};
pub use startup::{ParamList, StartupRequest};
