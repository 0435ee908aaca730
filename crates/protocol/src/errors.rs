//! Error types for the protocol layer.
//!
//! [`ProtocolError`] is only ever seen by callers on the encode side: decoding
//! absorbs every failure into [`crate::Message::Unknown`]. [`TransportError`] is
//! the error half of the [`crate::Transport`] port and is produced by whichever
//! infrastructure crate implements it.

use std::io;

use thiserror::Error;

use crate::MessageKind;

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

/// Failure to turn a message into a frame, or a frame into a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The JSON layer rejected the value or the bytes.
    #[error("JSON serialisation failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is a JSON object without an integer `type` field.
    #[error("frame has no integer 'type' field")]
    MissingType,

    /// The frame's `type` field does not name a known message kind.
    #[error("unknown message type {0}")]
    UnknownType(u64),

    /// A message body serialised to something other than a JSON object.
    #[error("{0:?} did not serialise to a JSON object")]
    NotAnObject(MessageKind),

    /// [`crate::Message::Unknown`] has no wire form.
    #[error("an unknown message cannot be encoded")]
    UnknownMessage,
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Failure reported by a [`crate::Transport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// `send` or `close` was called before `open` succeeded (or after `close`).
    #[error("transport is not connected; call open() first")]
    NotConnected,

    /// `open` was called on a transport that already holds a live connection.
    #[error("transport is already connected")]
    AlreadyConnected,

    /// The connection's writer stopped before the frame was handed to the socket.
    #[error("connection closed")]
    Closed,

    /// The endpoint kind cannot be dialled on this platform.
    #[error("unsupported endpoint: {0}")]
    Unsupported(String),

    /// The underlying socket failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Identifier errors
// ---------------------------------------------------------------------------

/// An identifier was constructed from an empty string.
///
/// Carries the identifier's type name so the message says which one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0} must not be empty")]
pub struct EmptyIdentifier(pub &'static str);
