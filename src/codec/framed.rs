use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{Frame, FrameHeader, FrameValidator};

const READ_CHUNK: usize = 4096;

/// Reads client frames from the read half of a socket.
///
/// Headers are validated before the payload is buffered. A frame that is
/// only too large is reported as [`Error::FrameTooLarge`] and its bytes are
/// skipped as they arrive, so the stream stays in sync and the connection
/// can continue.
pub struct FrameReader<R> {
    io: R,
    buf: BytesMut,
    validator: FrameValidator,
    skip: u64,
}

impl<R> FrameReader<R> {
    /// Create a reader that enforces `limits`.
    #[must_use]
    pub fn new(io: R, limits: Limits) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(READ_CHUNK),
            validator: FrameValidator::new(limits),
            skip: 0,
        }
    }

    /// Seed the buffer with bytes that arrived together with the handshake.
    pub fn prefill(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    fn discard_skipped(&mut self) {
        let n = self.skip.min(self.buf.len() as u64) as usize;
        self.buf.advance(n);
        self.skip -= n as u64;
    }

    fn try_decode(&mut self) -> Result<Option<Frame>> {
        let header = match FrameHeader::parse(&self.buf) {
            Ok(h) => h,
            Err(Error::IncompleteFrame { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        if let Err(e) = self.validator.validate(&header) {
            if matches!(e, Error::FrameTooLarge { .. }) {
                self.skip = header.wire_len();
                self.discard_skipped();
            }
            return Err(e);
        }

        match Frame::parse(&self.buf) {
            Ok((frame, consumed)) => {
                self.buf.advance(consumed);
                Ok(Some(frame))
            }
            Err(Error::IncompleteFrame { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Read the next frame.
    ///
    /// Returns `Ok(None)` on a clean end of stream between frames.
    ///
    /// # Errors
    ///
    /// - `Error::FrameTooLarge` for an oversized frame (non-fatal, its bytes are skipped)
    /// - header validation and parse errors (fatal to the connection)
    /// - `Error::Io` on read failure or end of stream mid-frame
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if self.skip > 0 {
                self.discard_skipped();
            }
            if self.skip == 0 {
                if let Some(frame) = self.try_decode()? {
                    return Ok(Some(frame));
                }
            }

            self.buf.reserve(READ_CHUNK);
            let n = self.io.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() && self.skip == 0 {
                    return Ok(None);
                }
                return Err(Error::Io("unexpected end of stream inside a frame".into()));
            }
        }
    }
}

/// Writes server frames to the write half of a socket.
pub struct FrameWriter<W> {
    io: W,
    buf: BytesMut,
}

impl<W> FrameWriter<W> {
    #[must_use]
    pub fn new(io: W) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Encode and write one unmasked frame, then flush.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        frame.encode(&mut self.buf, None);
        self.io.write_all(&self.buf).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write direction of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
