//! Encrypted, authenticated command-frame transport.
//!
//! Built from a plain transport once the handshake hands over its two
//! directional ciphers. Each frame is sealed under the next send nonce and
//! verified against the next receive nonce; the first failed verification
//! tears the transport down.

use std::time::Duration;

use aptrust::{AptrustError, Command, DirectionalCipher};
use bytes::{Bytes, BytesMut};
use tokio::io::{
    split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf,
};
use tokio::time::timeout;

use crate::error::{ApStreamError, Result};
use crate::frame::{sealed_expected_len, Frame, SealedFrame, MAX_FRAME_PAYLOAD};
use crate::plain::PlainTransport;

const READ_CHUNK: usize = 8192;

// ── Send half ────────────────────────────────────────────────────────────

/// Sending half: owns the send cipher. At most one send is in flight.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    cipher: DirectionalCipher,
    io_timeout: Duration,
    closed: bool,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(inner: W, cipher: DirectionalCipher, io_timeout: Duration) -> Self {
        Self {
            inner,
            cipher,
            io_timeout,
            closed: false,
        }
    }

    /// Nonce the next outgoing frame will use.
    pub fn nonce(&self) -> u32 {
        self.cipher.nonce()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Seal `payload` under the next send nonce and write it as one frame.
    ///
    /// A failed or timed-out write closes this half: the peer may have seen a
    /// partial frame and the counters can no longer be trusted.
    pub async fn send_frame(&mut self, command: Command, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(ApStreamError::ConnectionClosed);
        }
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(ApStreamError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }

        let nonce = self.cipher.nonce();
        let sealed = match self.cipher.seal(command.as_u8(), payload) {
            Ok(sealed) => sealed,
            Err(e) => {
                self.closed = true;
                return Err(e.into());
            }
        };
        let frame = SealedFrame {
            command: command.as_u8(),
            ciphertext: Bytes::from(sealed.ciphertext),
            tag: sealed.tag,
        };
        let mut buf = BytesMut::with_capacity(frame.encoded_len());
        frame.encode_into(&mut buf)?;

        let write = async {
            self.inner.write_all(&buf).await?;
            self.inner.flush().await
        };
        match timeout(self.io_timeout, write).await {
            Ok(Ok(())) => {
                tracing::debug!(?command, len = payload.len(), nonce, "frame sent");
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

    /// Shut the write side down. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.shutdown().await?;
        Ok(())
    }
}

// ── Receive half ─────────────────────────────────────────────────────────

/// Receiving half: owns the receive cipher and the read buffer.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    cipher: DirectionalCipher,
    closed: bool,
}

impl<R: AsyncRead + Unpin + Send> FrameReader<R> {
    /// `buffered` holds bytes already read past the handshake.
    pub fn new(inner: R, buffered: BytesMut, cipher: DirectionalCipher) -> Self {
        Self {
            inner,
            buf: buffered,
            cipher,
            closed: false,
        }
    }

    /// Nonce the next incoming frame must carry.
    pub fn nonce(&self) -> u32 {
        self.cipher.nonce()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wait for, verify and decrypt the next frame.
    ///
    /// Cancel-safe: dropping the future leaves any partial frame buffered for
    /// the next call.
    pub async fn receive_frame(&mut self) -> Result<Frame> {
        if self.closed {
            return Err(ApStreamError::ConnectionClosed);
        }
        loop {
            if let Some(sealed) = SealedFrame::decode(&mut self.buf) {
                return self.open(sealed);
            }

            self.buf.reserve(READ_CHUNK);
            let n = match self.inner.read_buf(&mut self.buf).await {
                Ok(n) => n,
                Err(e) => {
                    self.closed = true;
                    return Err(e.into());
                }
            };
            if n == 0 {
                self.closed = true;
                if self.buf.is_empty() {
                    return Err(ApStreamError::ConnectionClosed);
                }
                return Err(ApStreamError::ShortRead {
                    expected: sealed_expected_len(&self.buf),
                    actual: self.buf.len(),
                });
            }
        }
    }

    /// Like [`receive_frame`](Self::receive_frame) but gives up after
    /// `window`. A timeout here is not fatal; buffered bytes are kept.
    pub async fn receive_frame_within(&mut self, window: Duration) -> Result<Frame> {
        timeout(window, self.receive_frame())
            .await
            .map_err(|_| ApStreamError::Timeout)?
    }

    fn open(&mut self, sealed: SealedFrame) -> Result<Frame> {
        let nonce = self.cipher.nonce();
        let payload = match self.cipher.open(sealed.command, &sealed.ciphertext, &sealed.tag) {
            Ok(payload) => payload,
            Err(err) => {
                self.closed = true;
                self.buf.clear();
                tracing::warn!(nonce, command = sealed.command, error = %err, "dropping encrypted transport");
                return Err(match err {
                    AptrustError::Integrity => ApStreamError::Integrity,
                    other => other.into(),
                });
            }
        };

        let command = Command::try_from(sealed.command)
            .map_err(|_| ApStreamError::UnknownCommand(sealed.command))?;
        tracing::debug!(?command, len = payload.len(), nonce, "frame received");
        Ok(Frame::new(command, payload))
    }
}

// ── Whole transport ──────────────────────────────────────────────────────

/// Encrypted transport over one stream, both directions.
#[derive(Debug)]
pub struct EncryptedTransport<S> {
    writer: FrameWriter<WriteHalf<S>>,
    reader: FrameReader<ReadHalf<S>>,
}

impl<S> EncryptedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Take over the stream of a plain transport, including any bytes it has
    /// already buffered.
    pub fn new(plain: PlainTransport<S>, send: DirectionalCipher, recv: DirectionalCipher) -> Self {
        let io_timeout = plain.io_timeout();
        let (stream, buffered) = plain.into_parts();
        let (read_half, write_half) = split(stream);
        tracing::debug!(
            send_nonce = send.nonce(),
            recv_nonce = recv.nonce(),
            buffered = buffered.len(),
            "encrypted transport up"
        );
        Self {
            writer: FrameWriter::new(write_half, send, io_timeout),
            reader: FrameReader::new(read_half, buffered, recv),
        }
    }

    pub async fn send_frame(&mut self, command: Command, payload: &[u8]) -> Result<()> {
        if self.reader.is_closed() {
            return Err(ApStreamError::ConnectionClosed);
        }
        let result = self.writer.send_frame(command, payload).await;
        self.teardown_on_error(result).await
    }

    pub async fn receive_frame(&mut self) -> Result<Frame> {
        if self.writer.is_closed() {
            return Err(ApStreamError::ConnectionClosed);
        }
        let result = self.reader.receive_frame().await;
        self.teardown_on_error(result).await
    }

    /// Receive with a deadline. Running out of time leaves the transport
    /// open; any other failure tears it down.
    pub async fn receive_frame_within(&mut self, window: Duration) -> Result<Frame> {
        if self.writer.is_closed() {
            return Err(ApStreamError::ConnectionClosed);
        }
        let result = self.reader.receive_frame_within(window).await;
        match result {
            Err(ApStreamError::Timeout) => Err(ApStreamError::Timeout),
            other => self.teardown_on_error(other).await,
        }
    }

    pub fn send_nonce(&self) -> u32 {
        self.writer.nonce()
    }

    pub fn recv_nonce(&self) -> u32 {
        self.reader.nonce()
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_closed() || self.reader.is_closed()
    }

    /// Close both directions. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        self.reader.closed = true;
        self.writer.close().await
    }

    /// Independent halves for a queued writer and a dedicated reader loop.
    pub fn into_split(self) -> (FrameWriter<WriteHalf<S>>, FrameReader<ReadHalf<S>>) {
        (self.writer, self.reader)
    }

    async fn teardown_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Err(ApStreamError::FrameTooLarge { size, max }) => {
                Err(ApStreamError::FrameTooLarge { size, max })
            }
            Err(ApStreamError::UnknownCommand(byte)) => Err(ApStreamError::UnknownCommand(byte)),
            Err(e) => {
                if let Err(close_err) = self.close().await {
                    tracing::debug!(error = %close_err, "shutdown after failure");
                }
                Err(e)
            }
            ok => ok,
        }
    }
}
