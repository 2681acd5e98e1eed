use std::io::ErrorKind;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::codec::{FrameConfig, MessageCodec};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete message payloads from any `AsyncRead` stream.
///
/// Handles partial reads internally. Callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    codec: MessageCodec,
    eof: bool,
}

impl<T: AsyncRead + Unpin> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            codec: MessageCodec::with_config(config),
            eof: false,
        }
    }

    /// Read the next complete payload.
    ///
    /// Returns `Ok(None)` once the stream ended cleanly between frames and
    /// `Err(FrameError::IncompleteMessage)` if it ended inside one.
    ///
    /// Cancel safe: dropping the future never loses buffered bytes.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(payload) = self.codec.decode(&mut self.buf)? {
                return Ok(Some(payload));
            }

            if self.eof {
                return self.codec.decode_eof(&mut self.buf);
            }

            self.buf.reserve(READ_CHUNK_SIZE);
            let read = match self.inner.read_buf(&mut self.buf).await {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                debug!(buffered = self.buf.len(), "request stream ended");
                self.eof = true;
            }
        }
    }
}
