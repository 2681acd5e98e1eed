/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream ended before a frame's declared bytes were received.
    #[error("Incomplete message.")]
    IncompleteMessage,

    /// The frame is flagged as compressed.
    #[error("Compressed messages are not supported.")]
    Compressed,

    /// The compressed flag holds a value other than 0 or 1.
    #[error("invalid message flag {0:#04x}")]
    InvalidFlag(u8),

    /// A received frame declares more bytes than the configured limit.
    #[error("Received message exceeds the maximum configured message size.")]
    MessageTooLarge { size: usize, max: usize },

    /// An outgoing payload exceeds the configured limit or the wire maximum.
    #[error("Sending message exceeds the maximum configured message size.")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
