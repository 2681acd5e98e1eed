use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::{FrameError, Result};

/// Message prefix: flag (1) + length (4) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Flag value for an uncompressed message.
pub const FLAG_UNCOMPRESSED: u8 = 0;

/// Flag value for a compressed message.
pub const FLAG_COMPRESSED: u8 = 1;

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬─────────────────┐
/// │ Flag (1B)    │ Length       │ Payload         │
/// │ 0x00         │ (4B BE)      │ (Length bytes)  │
/// └──────────────┴──────────────┴─────────────────┘
/// ```
pub fn encode_message(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(FLAG_UNCOMPRESSED);
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_message(
    src: &mut BytesMut,
    max_message_size: Option<usize>,
) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    match src[0] {
        FLAG_UNCOMPRESSED => {}
        FLAG_COMPRESSED => return Err(FrameError::Compressed),
        other => return Err(FrameError::InvalidFlag(other)),
    }

    let payload_len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;

    if let Some(max) = max_message_size {
        if payload_len > max {
            return Err(FrameError::MessageTooLarge {
                size: payload_len,
                max,
            });
        }
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    trace!(len = payload_len, "decoded message");

    Ok(Some(payload))
}

/// Configuration for the message codec.
#[derive(Debug, Clone, Default)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: unlimited.
    pub max_message_size: Option<usize>,
}

impl FrameConfig {
    /// Limit payloads to `max` bytes.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = Some(max);
        self
    }
}

/// [`Decoder`]/[`Encoder`] for the message format.
///
/// At end of stream any buffered bytes that do not form a complete frame
/// (partial header or partial payload) are an
/// [`FrameError::IncompleteMessage`].
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    config: FrameConfig,
}

impl MessageCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }
}

impl Decoder for MessageCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        decode_message(src, self.config.max_message_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.decode(src)? {
            Some(payload) => Ok(Some(payload)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::IncompleteMessage),
        }
    }
}

impl Encoder<Bytes> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        Encoder::<&[u8]>::encode(self, payload.as_ref(), dst)
    }
}

impl Encoder<&[u8]> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        if let Some(max) = self.config.max_message_size {
            if payload.len() > max {
                return Err(FrameError::PayloadTooLarge {
                    size: payload.len(),
                    max,
                });
            }
        }
        encode_message(payload, dst)
    }
}
