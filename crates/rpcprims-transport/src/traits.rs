use bytes::Bytes;

use crate::error::Result;
use crate::trailers::Trailers;

/// Outbound half of a call's duplex stream.
///
/// Data is written in order; trailers are the final write of a response.
/// Implementations should reject anything written after the trailers.
pub trait ResponseSink: Send {
    /// Write response body bytes (already framed).
    fn send_data(&mut self, data: Bytes) -> Result<()>;

    /// Write the terminal trailers, ending the response.
    fn send_trailers(&mut self, trailers: Trailers) -> Result<()>;
}

impl<S: ResponseSink + ?Sized> ResponseSink for &mut S {
    fn send_data(&mut self, data: Bytes) -> Result<()> {
        (**self).send_data(data)
    }

    fn send_trailers(&mut self, trailers: Trailers) -> Result<()> {
        (**self).send_trailers(trailers)
    }
}

impl<S: ResponseSink + ?Sized> ResponseSink for Box<S> {
    fn send_data(&mut self, data: Bytes) -> Result<()> {
        (**self).send_data(data)
    }

    fn send_trailers(&mut self, trailers: Trailers) -> Result<()> {
        (**self).send_trailers(trailers)
    }
}
