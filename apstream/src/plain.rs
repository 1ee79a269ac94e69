//! Unauthenticated, length-framed transport used only during the handshake.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{ApStreamError, Result};
use crate::frame::{decode_plain, encode_plain, plain_expected_len};
use crate::resolver::Endpoint;

const READ_CHUNK: usize = 4096;

/// Plain frame transport over any async byte stream.
///
/// Reads go through an internal buffer, so a frame is either returned whole
/// or stays buffered; a timed-out read never loses bytes.
#[derive(Debug)]
pub struct PlainTransport<S> {
    stream: S,
    read_buf: BytesMut,
    io_timeout: Duration,
    closed: bool,
}

impl PlainTransport<TcpStream> {
    /// Open a TCP connection to `endpoint`.
    pub async fn connect(
        endpoint: &Endpoint,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self> {
        tracing::debug!(endpoint = %endpoint, "connecting");
        let stream = timeout(connect_timeout, TcpStream::connect(endpoint.as_str()))
            .await
            .map_err(|_| ApStreamError::Timeout)??;
        stream.set_nodelay(true)?;
        tracing::info!(endpoint = %endpoint, "connected");
        Ok(Self::new(stream, io_timeout))
    }
}

impl<S> PlainTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already connected stream.
    pub fn new(stream: S, io_timeout: Duration) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            io_timeout,
            closed: false,
        }
    }

    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write one frame carrying `payload`.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(ApStreamError::ConnectionClosed);
        }
        let mut buf = BytesMut::new();
        encode_plain(payload, &mut buf)?;

        let write = async {
            self.stream.write_all(&buf).await?;
            self.stream.flush().await
        };
        match timeout(self.io_timeout, write).await {
            Ok(Ok(())) => {
                tracing::trace!(len = payload.len(), "plain frame written");
                Ok(())
            }
            Ok(Err(e)) => {
                self.closed = true;
                Err(e.into())
            }
            Err(_) => {
                self.closed = true;
                Err(ApStreamError::Timeout)
            }
        }
    }

    /// Read the next complete frame.
    ///
    /// End of stream before any byte of a frame is `ConnectionClosed`; end of
    /// stream inside a frame is `ShortRead`.
    pub async fn read_frame(&mut self) -> Result<Bytes> {
        if self.closed {
            return Err(ApStreamError::ConnectionClosed);
        }
        loop {
            if let Some(frame) = decode_plain(&mut self.read_buf)? {
                tracing::trace!(len = frame.len(), "plain frame read");
                return Ok(frame);
            }

            self.read_buf.reserve(READ_CHUNK);
            let n = timeout(self.io_timeout, self.stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| ApStreamError::Timeout)??;

            if n == 0 {
                self.closed = true;
                if self.read_buf.is_empty() {
                    return Err(ApStreamError::ConnectionClosed);
                }
                return Err(ApStreamError::ShortRead {
                    expected: plain_expected_len(&self.read_buf),
                    actual: self.read_buf.len(),
                });
            }
        }
    }

    /// Shut the stream down. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        tracing::debug!("closing plain transport");
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Hand the stream and any bytes read past the last frame to the next
    /// layer.
    pub fn into_parts(self) -> (S, BytesMut) {
        (self.stream, self.read_buf)
    }
}
