//! Wire-level vocabulary of the Juno module bus.
//!
//! Every module on the bus speaks the same closed set of request/response
//! messages, one JSON object per line, correlated by a `requestId` string.
//! This crate owns that vocabulary and the port through which bytes reach a
//! peer; it performs no I/O itself.
//!
//! ## Architectural Layer
//!
//! **Protocol model + port definitions.** The `engine` crate drives the
//! request lifecycle on top of these types; the `transport` crate implements
//! [`Transport`] over TCP and Unix-domain sockets.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RequestId`, `ModuleId`, `HookName`, etc.) and the request id generator |
//! | [`messages`] | The message variants and their discriminant |
//! | [`codec`] | Newline-delimited JSON encoding and decoding |
//! | [`transport`] | The byte-stream [`Transport`] port |
//! | [`errors`] | Codec, transport, and identifier error types |

pub mod codec;
pub mod errors;
pub mod identifiers;
pub mod messages;
pub mod transport;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use codec::JsonCodec;
pub use errors::{EmptyIdentifier, ProtocolError, TransportError};
pub use identifiers::{
    ErrorCode, FunctionName, HookName, ModuleId, RequestId, RequestIdGenerator, ACTIVATED_HOOK,
    DEACTIVATED_HOOK,
};
pub use messages::{
    Arguments, DeclareFunctionRequest, DeclareFunctionResponse, Dependencies, ErrorMessage,
    FunctionCallRequest, FunctionCallResponse, Message, MessageKind, RegisterHookRequest,
    RegisterHookResponse, RegisterModuleRequest, RegisterModuleResponse, TriggerHookRequest,
    TriggerHookResponse,
};
pub use transport::{DataHandler, DispatchFuture, Transport};
