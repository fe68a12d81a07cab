//! Framed message transport over one duplex byte stream.
//!
//! A connection is split into a [`MessageReader`] and a [`MessageWriter`] so the
//! receive loop and the outbound queue can live in separate tasks.

use crate::codec::{decode, encode, Decoded, FrameError, CHUNK_SIZE};
use crate::message::Message;
use log::debug;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the stream, or the stream failed.
    #[error("connection closed")]
    Disconnect,
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
    #[error("failed to encode outgoing message: {0}")]
    Encode(#[source] FrameError),
}

/// Receiving half of a connection.
pub struct MessageReader<R> {
    inner: R,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    /// Waits until at least one complete message is decodable and returns every
    /// message decoded so far, in stream order.
    ///
    /// Individual entries may be protocol violations; those leave the stream
    /// usable. A zero-length read or any I/O failure is reported as
    /// [`TransportError::Disconnect`].
    pub async fn receive(&mut self) -> Result<Vec<Decoded>, TransportError> {
        let mut read_buf = [0u8; CHUNK_SIZE];
        loop {
            let (messages, consumed) = decode(&self.buffer)?;
            if consumed > 0 {
                self.buffer.drain(..consumed);
            }
            if !messages.is_empty() {
                for message in messages.iter().flatten() {
                    debug!(
                        "RECV {} sent at {} ({} ms)",
                        message.action,
                        message.timestamp,
                        message.latency_ms()
                    );
                }
                return Ok(messages);
            }

            let n = match self.inner.read(&mut read_buf).await {
                Ok(0) => return Err(TransportError::Disconnect),
                Ok(n) => n,
                Err(e) => {
                    debug!("read failed: {}", e);
                    return Err(TransportError::Disconnect);
                }
            };
            self.buffer.extend_from_slice(&read_buf[..n]);
        }
    }

    /// Bytes received but not yet part of a complete message.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

/// Sending half of a connection.
pub struct MessageWriter<W> {
    inner: W,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Disconnect);
        }
        let bytes = encode(message).map_err(TransportError::Encode)?;
        if let Err(e) = self.inner.write_all(&bytes).await {
            debug!("write failed: {}", e);
            return Err(TransportError::Disconnect);
        }
        if let Err(e) = self.inner.flush().await {
            debug!("flush failed: {}", e);
            return Err(TransportError::Disconnect);
        }
        debug!(
            "SEND {} at {} ({} bytes)",
            message.action,
            message.timestamp,
            bytes.len()
        );
        Ok(())
    }

    /// Shuts the stream down. Calling it again is a no-op.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.inner.shutdown().await {
            debug!("shutdown failed: {}", e);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Splits a TCP connection into its framed halves.
pub fn split_tcp(stream: TcpStream) -> (MessageReader<OwnedReadHalf>, MessageWriter<OwnedWriteHalf>) {
    let (read, write) = stream.into_split();
    (MessageReader::new(read), MessageWriter::new(write))
}

/// Splits any duplex stream into its framed halves.
pub fn split<S>(stream: S) -> (MessageReader<ReadHalf<S>>, MessageWriter<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite,
{
    let (read, write) = tokio::io::split(stream);
    (MessageReader::new(read), MessageWriter::new(write))
}
