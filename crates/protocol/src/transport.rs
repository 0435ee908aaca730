//! The byte-stream port between the engine and a concrete connection.
//!
//! A [`Transport`] moves opaque frames. It knows nothing about message
//! kinds; framing is newline-delimited, so an implementation splits its
//! inbound stream on `\n` and hands each line (delimiter removed) to the
//! installed [`DataHandler`], one task per line.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::TransportError;

/// Future returned by a [`DataHandler`]; resolves to `true` if the frame was
/// handled successfully.
pub type DispatchFuture = Pin<Box<dyn Future<Output = bool> + Send + 'static>>;

/// Callback invoked once per inbound frame.
pub type DataHandler = Arc<dyn Fn(Vec<u8>) -> DispatchFuture + Send + Sync>;

/// A bidirectional byte-stream connection to the bus.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes the connection and starts delivering inbound frames.
    async fn open(&self) -> Result<(), TransportError>;

    /// Tears the connection down. Queued outbound frames are still written.
    fn close(&self) -> Result<(), TransportError>;

    /// Writes `frame` to the peer as-is; the caller supplies the delimiter.
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Installs the callback for inbound frames, replacing any previous one.
    fn set_data_handler(&self, handler: DataHandler);
}
