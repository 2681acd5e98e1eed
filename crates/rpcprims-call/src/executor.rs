use std::any::Any;
use std::sync::Arc;

use rpcprims_frame::{FrameConfig, FrameError, FrameWriter};
use rpcprims_transport::ResponseSink;
use tokio::io::AsyncRead;
use tokio::task::JoinError;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, warn};

use crate::context::CallContext;
use crate::error::{CallError, HandlerError};
use crate::handler::{ClientStreamingHandler, HandlerResult};
use crate::marshaller::Marshaller;
use crate::options::CallOptions;
use crate::reader::MessageReader;
use crate::status::{resolve_status, CallOutcome, Status, SERIALIZE_FAILED_MESSAGE};

/// Runs client-streaming calls for one registered method.
///
/// For every call the handler is spawned exactly once with a fresh
/// [`MessageReader`]; the executor waits for it, resolves the outcome to a
/// [`Status`], writes the response (on success) and then the trailers.
/// Nothing escapes [`run`](Self::run) as an error.
pub struct ClientStreamingExecutor<Req, Resp> {
    method: String,
    handler: Arc<dyn ClientStreamingHandler<Req, Resp>>,
    request_marshaller: Arc<dyn Marshaller<Req>>,
    response_marshaller: Arc<dyn Marshaller<Resp>>,
    options: CallOptions,
}

impl<Req, Resp> ClientStreamingExecutor<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn new(
        method: impl Into<String>,
        handler: impl ClientStreamingHandler<Req, Resp>,
        request_marshaller: impl Marshaller<Req>,
        response_marshaller: impl Marshaller<Resp>,
    ) -> Self {
        Self {
            method: method.into(),
            handler: Arc::new(handler),
            request_marshaller: Arc::new(request_marshaller),
            response_marshaller: Arc::new(response_marshaller),
            options: CallOptions::default(),
        }
    }

    /// Override call options.
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    /// Execute one call to completion and return the status written.
    pub async fn run<B, S>(&self, body: B, sink: &mut S, ctx: CallContext) -> Status
    where
        B: AsyncRead + Send + Unpin + 'static,
        S: ResponseSink + ?Sized,
    {
        debug!(method = %self.method, "client streaming call started");

        let frame_config = FrameConfig {
            max_message_size: self.options.max_receive_message_size,
        };
        let requests = MessageReader::new(
            Box::new(body),
            frame_config,
            Arc::clone(&self.request_marshaller),
            ctx.clone(),
        );

        // Dropping `run` aborts the handler task.
        let task = tokio::spawn(self.handler.handle(requests, ctx.clone()));
        let joined = AbortOnDropHandle::new(task).await;
        let outcome = self.outcome(joined, &ctx);
        let mut status = resolve_status(&outcome, &self.options);

        if let CallOutcome::Success(response) = outcome {
            if let Err(fault) = self.write_response(&response, sink) {
                status = fault;
            }
        }

        if let Err(err) = ctx.complete(&status, sink) {
            warn!(method = %self.method, error = %err, "failed to write call trailers");
        }

        debug!(
            method = %self.method,
            code = %status.code(),
            message = status.message().unwrap_or(""),
            "client streaming call completed"
        );
        status
    }

    fn outcome(
        &self,
        joined: Result<HandlerResult<Resp>, JoinError>,
        ctx: &CallContext,
    ) -> CallOutcome<Resp> {
        // A protocol fault on the request stream overrides whatever the
        // handler produced afterwards.
        if let Some(fault) = ctx.take_protocol_fault() {
            return CallOutcome::Fault(HandlerError::Call(fault));
        }

        if ctx.is_cancelled_externally() {
            return CallOutcome::Cancelled;
        }

        match joined {
            Ok(Ok(Some(response))) => CallOutcome::Success(response),
            Ok(Ok(None)) => CallOutcome::NoResult,
            // The handler cancelled the call itself and returned without a value.
            Ok(Err(HandlerError::Call(CallError::Cancelled))) => {
                debug!(method = %self.method, "handler stopped after cancelling the call");
                CallOutcome::NoResult
            }
            Ok(Err(fault)) => {
                warn!(method = %self.method, error = %fault, "handler fault");
                CallOutcome::Fault(fault)
            }
            Err(err) if err.is_panic() => {
                let msg = panic_message(err.into_panic());
                error!(method = %self.method, panic = %msg, "handler panicked");
                CallOutcome::Fault(HandlerError::Panicked(msg))
            }
            Err(_) => CallOutcome::Cancelled,
        }
    }

    fn write_response<S>(&self, response: &Resp, sink: &mut S) -> Result<(), Status>
    where
        S: ResponseSink + ?Sized,
    {
        let payload = self.response_marshaller.serialize(response).map_err(|err| {
            error!(method = %self.method, error = %err, "response serialization failed");
            Status::internal(SERIALIZE_FAILED_MESSAGE)
        })?;

        let config = FrameConfig {
            max_message_size: self.options.max_send_message_size,
        };
        let mut writer = FrameWriter::with_config(sink, config);
        writer.send(&payload).map_err(|err| {
            warn!(method = %self.method, error = %err, "failed to write response message");
            match err {
                FrameError::PayloadTooLarge { .. } => Status::resource_exhausted(err.to_string()),
                other => Status::internal(CallError::from(other).to_string()),
            }
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

impl<Req, Resp> std::fmt::Debug for ClientStreamingExecutor<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientStreamingExecutor")
            .field("method", &self.method)
            .field("options", &self.options)
            .finish()
    }
}
