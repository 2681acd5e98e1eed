//! Server-side client-streaming RPC primitives.
//!
//! rpcprims runs client-streaming calls over gRPC-style length-prefixed
//! framing: the client sends a stream of request messages, the handler pulls
//! them at its own pace, and the call ends with at most one response message
//! followed by status trailers.
//!
//! # Crate Structure
//!
//! - [`transport`]: request body and response sink abstractions, trailers
//! - [`frame`]: 5-byte prefix message framing
//! - [`call`]: message reader, call context, executor, status mapping
//! - [`logging`]: `tracing-subscriber` setup (behind `logging` feature)

/// Re-export transport types.
pub mod transport {
    pub use rpcprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rpcprims_frame::*;
}

/// Re-export call types.
pub mod call {
    pub use rpcprims_call::*;
}

#[cfg(feature = "logging")]
pub mod logging;

pub use rpcprims_call::{
    CallContext, CallOptions, ClientStreamingExecutor, HandlerError, HandlerResult,
    JsonMarshaller, MessageReader, MethodRegistry, Status, StatusCode,
};
