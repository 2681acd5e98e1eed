//! Status codes, terminal call status and the outcome-to-status mapping.

use std::borrow::Cow;
use std::fmt::{self, Write as _};

use rpcprims_frame::FrameError;
use rpcprims_transport::Trailers;

use crate::error::{CallError, HandlerError};
use crate::options::CallOptions;

/// Trailer carrying the numeric status code.
pub const STATUS_TRAILER: &str = "grpc-status";
/// Trailer carrying the percent-encoded status message.
pub const MESSAGE_TRAILER: &str = "grpc-message";

/// Handler completed without a value and without a fault.
pub const NO_RESULT_MESSAGE: &str = "No message returned from method.";
/// Call terminated by the transport or an external cancellation source.
pub const CLIENT_CANCELLED_MESSAGE: &str = "Call canceled by the client.";
/// Unclassified handler fault when detailed errors are disabled.
pub const HANDLER_FAULT_MESSAGE: &str = "Exception was thrown by handler.";
/// No method registered for the requested path.
pub const UNIMPLEMENTED_MESSAGE: &str = "Method is unimplemented.";
/// Response could not be serialized.
pub const SERIALIZE_FAILED_MESSAGE: &str = "Failed to serialize response message.";

/// gRPC status codes (<https://grpc.github.io/grpc/core/md_doc_statuscodes.html>).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl StatusCode {
    /// Value written to the status trailer.
    pub fn to_trailer_value(self) -> String {
        (self as u8).to_string()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DataLoss => "DATA_LOSS",
            Self::Unauthenticated => "UNAUTHENTICATED",
        };
        f.write_str(name)
    }
}

/// Terminal status of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: StatusCode,
    message: Option<String>,
    metadata: Trailers,
}

impl Status {
    /// Create a status with a message.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            metadata: Trailers::new(),
        }
    }

    /// Successful completion, no message.
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: None,
            metadata: Trailers::new(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Cancelled, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unknown, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(StatusCode::ResourceExhausted, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unimplemented, message)
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Extra trailers carried with this status.
    pub fn metadata(&self) -> &Trailers {
        &self.metadata
    }

    /// Attach an extra trailer. Reserved status keys are ignored.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert_metadata(key, value);
        self
    }

    pub(crate) fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if is_reserved_trailer(&key) {
            return;
        }
        self.metadata.insert(key, value);
    }

    /// Build the trailer block: status code, optional message, then metadata.
    pub fn to_trailers(&self) -> Trailers {
        let mut trailers = Trailers::new();
        trailers.insert(STATUS_TRAILER, self.code.to_trailer_value());
        if let Some(message) = &self.message {
            trailers.insert(MESSAGE_TRAILER, percent_encode(message));
        }
        for (key, value) in self.metadata.iter() {
            trailers.insert(key, value);
        }
        trailers
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for Status {}

/// Returns true for keys owned by the status trailers.
pub fn is_reserved_trailer(key: &str) -> bool {
    key.eq_ignore_ascii_case(STATUS_TRAILER) || key.eq_ignore_ascii_case(MESSAGE_TRAILER)
}

/// Percent-encode a status message for the message trailer.
///
/// Bytes outside printable ASCII, and `%` itself, become `%XX`.
pub fn percent_encode(message: &str) -> Cow<'_, str> {
    fn passthrough(b: u8) -> bool {
        (0x20..=0x7E).contains(&b) && b != b'%'
    }

    if message.bytes().all(passthrough) {
        return Cow::Borrowed(message);
    }

    let mut out = String::with_capacity(message.len() + 8);
    for b in message.bytes() {
        if passthrough(b) {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    Cow::Owned(out)
}

/// Result of one client-streaming call, produced once by the executor.
#[derive(Debug)]
pub enum CallOutcome<Resp> {
    /// The handler returned a response.
    Success(Resp),
    /// The handler (or the request stream) failed.
    Fault(HandlerError),
    /// The handler returned neither a response nor a fault.
    NoResult,
    /// The transport or an external source cancelled the call.
    Cancelled,
}

/// Map a call outcome to its terminal status.
///
/// | Outcome | Code | Message |
/// |---|---|---|
/// | `Success` | OK | none |
/// | `NoResult` | CANCELLED | "No message returned from method." |
/// | `Fault` (framing) | INTERNAL | the frame error, e.g. "Incomplete message." |
/// | `Fault` (explicit status) | carried code | carried message |
/// | `Fault` (other) | UNKNOWN | fault text, or a fixed message without detailed errors |
/// | `Cancelled` | CANCELLED | "Call canceled by the client." |
pub fn resolve_status<Resp>(outcome: &CallOutcome<Resp>, options: &CallOptions) -> Status {
    match outcome {
        CallOutcome::Success(_) => Status::ok(),
        CallOutcome::NoResult => Status::cancelled(NO_RESULT_MESSAGE),
        CallOutcome::Cancelled => Status::cancelled(CLIENT_CANCELLED_MESSAGE),
        CallOutcome::Fault(fault) => fault_status(fault, options),
    }
}

fn fault_status(fault: &HandlerError, options: &CallOptions) -> Status {
    match fault {
        HandlerError::Status(status) => status.clone(),
        HandlerError::Call(err) => call_error_status(err),
        HandlerError::Other(err) if options.detailed_errors => Status::unknown(err.to_string()),
        HandlerError::Panicked(msg) if options.detailed_errors => {
            Status::unknown(format!("{HANDLER_FAULT_MESSAGE} Panic: {msg}"))
        }
        HandlerError::Other(_) | HandlerError::Panicked(_) => {
            Status::unknown(HANDLER_FAULT_MESSAGE)
        }
    }
}

fn call_error_status(err: &CallError) -> Status {
    match err {
        CallError::Protocol(frame) => match frame.as_ref() {
            FrameError::MessageTooLarge { .. } | FrameError::PayloadTooLarge { .. } => {
                Status::resource_exhausted(frame.to_string())
            }
            _ => Status::internal(frame.to_string()),
        },
        CallError::Deserialize(_) => Status::internal(err.to_string()),
        CallError::Cancelled => Status::cancelled(CLIENT_CANCELLED_MESSAGE),
        CallError::NoCurrentMessage
        | CallError::AlreadyCompleted
        | CallError::DuplicateMethod(_) => Status::unknown(err.to_string()),
        CallError::Transport(_) => Status::internal(err.to_string()),
    }
}
