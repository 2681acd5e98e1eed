//! Client-streaming call execution.
//!
//! A call flows through:
//! - [`MessageReader`]: pulls frames off the request body and deserializes
//!   them on demand
//! - [`CallContext`]: cancellation, deadline and write-once trailers
//! - [`ClientStreamingExecutor`]: invokes the handler once and drives the call
//! - [`resolve_status`]: maps the outcome to the terminal [`Status`]

pub mod context;
pub mod error;
pub mod executor;
pub mod handler;
pub mod marshaller;
pub mod options;
pub mod reader;
pub mod registry;
pub mod status;

pub use context::{CallContext, CallContextBuilder};
pub use error::{CallError, HandlerError, Result};
pub use executor::ClientStreamingExecutor;
pub use handler::{BoxFuture, ClientStreamingHandler, HandlerResult};
pub use marshaller::{JsonMarshaller, MarshalError, Marshaller};
pub use options::CallOptions;
pub use reader::{MessageReader, RequestBody};
pub use registry::{MethodRegistry, ServerMethod};
pub use status::{
    resolve_status, CallOutcome, Status, StatusCode, CLIENT_CANCELLED_MESSAGE,
    HANDLER_FAULT_MESSAGE, MESSAGE_TRAILER, NO_RESULT_MESSAGE, STATUS_TRAILER,
    UNIMPLEMENTED_MESSAGE,
};
pub use tokio_util::sync::CancellationToken;
