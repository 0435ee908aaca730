//! Client-side runtime for a module on the Juno bus.
//!
//! [`JunoModule`] registers with the bus, declares functions other modules may
//! call, calls theirs, and subscribes to or fires hooks. Every request is
//! correlated with its response through a `requestId`; the caller gets a
//! [`PendingResponse`] to await.
//!
//! ## Lifecycle
//!
//! ```text
//! Unregistered ──initialize()──▶ Buffering ──juno.activated──▶ Active
//!                                    ▲                           │
//!                                    └────juno.deactivated───────┘
//! ```
//!
//! While not `Active`, every request except registration is held in an
//! outbound buffer. Activation flushes the buffer in one write.
//!
//! ## Architectural Layer
//!
//! **Orchestration.** Framing and message shapes come from the [`protocol`]
//! crate; bytes move through whatever [`protocol::Transport`] the caller
//! supplies (see the `transport` crate for sockets).
//!
//! ## Concurrency
//!
//! Registration state, the outbound buffer, and the pending-request table are
//! owned by a single correlator task and changed only through its command
//! channel. The function and hook registries are shared behind read/write
//! locks. Each inbound frame is dispatched on its own task, so a slow function
//! handler delays only the call it is serving.

pub mod config;
pub mod errors;
pub mod module;
pub mod registry;
pub mod state;

mod correlator;
mod dispatch;

pub use config::ModuleConfig;
pub use errors::ModuleError;
pub use module::{JunoModule, PendingResponse};
pub use registry::{FunctionFuture, FunctionHandler, HookListener};
pub use state::ModuleState;

pub use protocol::{Arguments, Dependencies};
