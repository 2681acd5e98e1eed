//! Length-prefixed message framing for client-streaming calls.
//!
//! Every message is framed with the gRPC message prefix:
//! - A 1-byte compressed flag (always 0; compression is not supported)
//! - A 4-byte big-endian payload length
//!
//! A stream may end between frames; ending inside a frame is an
//! [`FrameError::IncompleteMessage`].

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_message, encode_message, FrameConfig, MessageCodec, FLAG_COMPRESSED,
    FLAG_UNCOMPRESSED, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
