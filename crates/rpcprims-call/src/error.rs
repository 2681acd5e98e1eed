use std::sync::Arc;

use rpcprims_frame::FrameError;
use rpcprims_transport::TransportError;

use crate::marshaller::MarshalError;
use crate::status::Status;

/// Errors raised by the call machinery itself.
///
/// Cheap to clone: the message reader hands one copy to the handler and
/// records another for the executor.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    /// The request stream violated the framing protocol.
    #[error("{0}")]
    Protocol(Arc<FrameError>),

    /// A request payload could not be deserialized.
    #[error("Failed to deserialize request message.")]
    Deserialize(Arc<MarshalError>),

    /// The call was cancelled before the pull completed.
    #[error("call cancelled")]
    Cancelled,

    /// `current()` was called before a message was produced.
    #[error("no current message; advance() has not produced one")]
    NoCurrentMessage,

    /// The call's final status was already written.
    #[error("call already completed")]
    AlreadyCompleted,

    /// A method with this path is already registered.
    #[error("method already registered: {0}")]
    DuplicateMethod(String),

    /// Writing to the response sink failed.
    #[error("response transport error: {0}")]
    Transport(Arc<TransportError>),
}

impl From<FrameError> for CallError {
    fn from(err: FrameError) -> Self {
        CallError::Protocol(Arc::new(err))
    }
}

impl From<TransportError> for CallError {
    fn from(err: TransportError) -> Self {
        CallError::Transport(Arc::new(err))
    }
}

/// Failure returned by a handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A fault carrying its own status classification.
    #[error("{0}")]
    Status(Status),

    /// A call machinery error, usually propagated from the reader with `?`.
    #[error(transparent)]
    Call(#[from] CallError),

    /// Any other failure inside handler logic.
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),

    /// The handler task panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Wrap an arbitrary error as an unclassified handler fault.
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        HandlerError::Other(err.into())
    }
}

impl From<Status> for HandlerError {
    fn from(status: Status) -> Self {
        HandlerError::Status(status)
    }
}

pub type Result<T> = std::result::Result<T, CallError>;
