//! Stream-socket implementation of [`Transport`].

use std::io;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use protocol::{DataHandler, Transport, TransportError};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::Endpoint;

type Reader = Box<dyn AsyncRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type SharedHandler = Arc<RwLock<Option<DataHandler>>>;

/// A frame queued for the writer task, with a slot for the write result.
struct OutboundFrame {
    bytes: Vec<u8>,
    written: oneshot::Sender<io::Result<()>>,
}

/// A live connection: the writer queue and the read task.
struct Connection {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    reader: JoinHandle<()>,
}

/// [`Transport`] over a TCP or Unix-domain stream socket.
///
/// Inbound bytes are split on `\n`; each non-empty line (delimiter and any
/// trailing `\r` removed) is handed to the data handler on its own task.
/// Outbound frames go through a single writer task so that concurrent
/// [`send`](Transport::send) calls never interleave their bytes.
pub struct SocketTransport {
    endpoint: Endpoint,
    handler: SharedHandler,
    connection: Mutex<Option<Connection>>,
}

impl SocketTransport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            handler: Arc::default(),
            connection: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn connect(&self) -> Result<(Reader, Writer), TransportError> {
        match &self.endpoint {
            Endpoint::Tcp(address) => {
                let stream = TcpStream::connect(address.as_str()).await?;
                stream.set_nodelay(true)?;
                let (read_half, write_half) = stream.into_split();
                Ok((Box::new(read_half), Box::new(write_half)))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await?;
                let (read_half, write_half) = stream.into_split();
                Ok((Box::new(read_half), Box::new(write_half)))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(TransportError::Unsupported(self.endpoint.to_string())),
        }
    }

    fn lock_connection(&self) -> std::sync::MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn open(&self) -> Result<(), TransportError> {
        if self.lock_connection().is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let (reader, writer) = self.connect().await?;

        let mut connection = self.lock_connection();
        if connection.is_some() {
            // Another open() won the race; this stream is dropped unused.
            return Err(TransportError::AlreadyConnected);
        }
        let (outbound, queue) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(writer, queue));
        let reader = tokio::spawn(read_loop(reader, Arc::clone(&self.handler)));
        *connection = Some(Connection { outbound, reader });

        info!(endpoint = %self.endpoint, "connected to bus");
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        let connection = self.lock_connection().take().ok_or(TransportError::NotConnected)?;
        connection.reader.abort();
        // Dropping the queue sender lets the writer drain and shut down.
        drop(connection.outbound);
        info!(endpoint = %self.endpoint, "connection closed");
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let outbound = self
            .lock_connection()
            .as_ref()
            .map(|connection| connection.outbound.clone())
            .ok_or(TransportError::NotConnected)?;

        let (written, result) = oneshot::channel();
        outbound
            .send(OutboundFrame {
                bytes: frame.to_vec(),
                written,
            })
            .map_err(|_| TransportError::Closed)?;

        result.await.map_err(|_| TransportError::Closed)??;
        Ok(())
    }

    fn set_data_handler(&self, handler: DataHandler) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        if let Some(connection) = self.lock_connection().take() {
            connection.reader.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Connection tasks
// ---------------------------------------------------------------------------

async fn read_loop(reader: Reader, handler: SharedHandler) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => {
                info!("bus closed the connection");
                break;
            }
            Ok(_) => {
                let frame = trim_delimiter(&line);
                if frame.is_empty() {
                    continue;
                }
                let current = handler.read().unwrap_or_else(PoisonError::into_inner).clone();
                match current {
                    Some(handler) => {
                        tokio::spawn(handler(frame.to_vec()));
                    }
                    None => warn!(len = frame.len(), "frame received with no data handler installed"),
                }
            }
            Err(error) => {
                warn!(%error, "read from bus failed");
                break;
            }
        }
    }
}

async fn write_loop(mut writer: Writer, mut queue: mpsc::UnboundedReceiver<OutboundFrame>) {
    while let Some(frame) = queue.recv().await {
        let result = write_frame(&mut writer, &frame.bytes).await;
        let failed = result.is_err();
        if let Err(error) = &result {
            warn!(%error, "write to bus failed");
        }
        let _ = frame.written.send(result);
        if failed {
            return;
        }
    }
    if let Err(error) = writer.shutdown().await {
        debug!(%error, "socket shutdown failed");
    }
}

async fn write_frame(writer: &mut Writer, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

fn trim_delimiter(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiters_are_trimmed() {
        assert_eq!(trim_delimiter(b"{}\n"), b"{}");
        assert_eq!(trim_delimiter(b"{}\r\n"), b"{}");
        assert_eq!(trim_delimiter(b"{}"), b"{}");
        assert_eq!(trim_delimiter(b"\n"), b"");
    }
}
