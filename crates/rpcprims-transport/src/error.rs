/// Errors that can occur on the call's byte stream.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The other side of the stream has gone away.
    #[error("transport closed")]
    Closed,

    /// Trailers were already written for this response.
    #[error("response trailers already sent")]
    TrailersSent,
}

pub type Result<T> = std::result::Result<T, TransportError>;
