use std::future::Future;
use std::pin::Pin;

use crate::context::CallContext;
use crate::error::HandlerError;
use crate::reader::MessageReader;

/// Boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a client-streaming handler produces: a response, no response
/// (`Ok(None)`), or a fault.
pub type HandlerResult<Resp> = Result<Option<Resp>, HandlerError>;

/// User logic for one client-streaming method.
///
/// The handler receives the request messages as a [`MessageReader`] it pulls
/// from at its own pace, plus the call's [`CallContext`]. It is invoked
/// exactly once per call.
///
/// Implemented for any `Fn(MessageReader<Req>, CallContext) -> impl Future`.
pub trait ClientStreamingHandler<Req, Resp>: Send + Sync + 'static {
    fn handle(
        &self,
        requests: MessageReader<Req>,
        ctx: CallContext,
    ) -> BoxFuture<'static, HandlerResult<Resp>>;
}

impl<Req, Resp, F, Fut> ClientStreamingHandler<Req, Resp> for F
where
    F: Fn(MessageReader<Req>, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Resp>> + Send + 'static,
{
    fn handle(
        &self,
        requests: MessageReader<Req>,
        ctx: CallContext,
    ) -> BoxFuture<'static, HandlerResult<Resp>> {
        Box::pin(self(requests, ctx))
    }
}
