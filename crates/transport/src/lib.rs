//! Socket transports for a Juno module.
//!
//! Implements the [`protocol::Transport`] port over a TCP or Unix-domain
//! stream socket. The engine crate sees only the trait.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Connection setup, line splitting of the inbound stream,
//! and the serialised writer task live here. Message kinds and correlation are
//! not this crate's business.
//!
//! ## Endpoints
//!
//! A connection string is resolved by [`Endpoint::parse`]:
//!
//! - `host:port` (or a literal socket address) dials TCP.
//! - anything else is treated as a Unix socket path, e.g. `../juno.sock`.

mod endpoint;
mod socket;

pub use endpoint::Endpoint;
pub use socket::SocketTransport;
