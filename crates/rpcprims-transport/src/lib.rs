//! Duplex byte stream seams for client-streaming calls.
//!
//! This is the lowest layer of rpcprims. The engine reads the request body
//! from any [`tokio::io::AsyncRead`] and writes response data and the final
//! trailers to a [`ResponseSink`]. In-memory implementations of both sides
//! are provided:
//! - [`ChunkedBody`]: request body fed chunk by chunk through a [`BodySender`]
//! - [`ResponseChannel`]: response sink observed through a [`ResponseReceiver`]

pub mod body;
pub mod error;
pub mod response;
pub mod trailers;
pub mod traits;

pub use body::{body_channel, BodySender, ChunkedBody};
pub use error::{Result, TransportError};
pub use response::{response_channel, CollectedResponse, ResponseChannel, ResponseEvent, ResponseReceiver};
pub use trailers::Trailers;
pub use traits::ResponseSink;
