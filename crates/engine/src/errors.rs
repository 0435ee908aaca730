//! Errors surfaced to callers of [`crate::JunoModule`].
//!
//! Only failures the caller can act on appear here: using the module before
//! `initialize`, registering twice, unencodable messages, transport failures,
//! and the eventual outcome of an awaited request. Malformed inbound frames,
//! responses for unknown request ids, and calls to undeclared functions are
//! absorbed by the dispatcher and only logged.

use std::time::Duration;

use protocol::{EmptyIdentifier, ErrorCode, HookName, ProtocolError, RequestId, TransportError};
use thiserror::Error;

/// Errors returned by module operations and by awaited responses.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// An operation other than `initialize` was attempted before `initialize`
    /// succeeded.
    #[error("module is not initialized; call initialize() first")]
    NotInitialized,

    /// `initialize` was called on a module that is already registered.
    #[error("module is already registered")]
    AlreadyRegistered,

    /// A name argument was empty.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] EmptyIdentifier),

    /// The hook is a bus control signal and cannot be registered or fired.
    #[error("hook '{0}' is reserved for bus control signals")]
    ReservedHook(HookName),

    /// The outgoing message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[source] ProtocolError),

    /// The transport refused the frame or could not be opened.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Buffered frames were discarded because the activation flush failed.
    #[error("failed to flush buffered frames: {reason}")]
    FlushFailed {
        /// Text of the transport error that failed the flush.
        reason: String,
    },

    /// The bus answered the request with an error frame.
    #[error("remote module reported error code {code}")]
    Remote {
        /// Code carried by the error frame.
        code: ErrorCode,
    },

    /// No response arrived within the configured request timeout.
    #[error("no response to request {request_id} within {timeout:?}")]
    Timeout {
        /// The request that went unanswered.
        request_id: RequestId,
        /// The timeout that expired.
        timeout: Duration,
    },

    /// The correlator task stopped before the operation completed.
    #[error("module engine has stopped")]
    EngineStopped,
}
