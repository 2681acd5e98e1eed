use bytes::BytesMut;
use rpcprims_transport::{ResponseSink, TransportError};
use tokio_util::codec::Encoder;

use crate::codec::{FrameConfig, MessageCodec};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes framed messages to a [`ResponseSink`].
pub struct FrameWriter<S> {
    inner: S,
    buf: BytesMut,
    codec: MessageCodec,
}

impl<S: ResponseSink> FrameWriter<S> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: S, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            codec: MessageCodec::with_config(config),
        }
    }

    /// Frame a payload and write it as response data.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        Encoder::<&[u8]>::encode(&mut self.codec, payload, &mut self.buf)?;
        let framed = self.buf.split().freeze();
        self.inner
            .send_data(framed)
            .map_err(transport_to_frame_error)
    }
}

fn transport_to_frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::Io(io) => FrameError::Io(io),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
