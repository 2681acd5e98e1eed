use std::sync::Arc;

use rpcprims_frame::{FrameConfig, FrameError, FrameReader};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::context::CallContext;
use crate::error::{CallError, Result};
use crate::marshaller::Marshaller;

/// Type-erased request body.
pub type RequestBody = Box<dyn AsyncRead + Send + Unpin>;

enum ReaderState {
    Reading,
    Finished,
    Failed(CallError),
}

/// Pull-based, single-pass sequence of request messages for one call.
///
/// Each successful [`advance`](Self::advance) decodes exactly one frame and
/// deserializes it; messages arrive in wire order. The reader suspends until
/// a full frame is buffered or the stream ends.
pub struct MessageReader<Req> {
    frames: FrameReader<RequestBody>,
    marshaller: Arc<dyn Marshaller<Req>>,
    ctx: CallContext,
    current: Option<Req>,
    state: ReaderState,
    received: u64,
}

impl<Req: 'static> MessageReader<Req> {
    pub fn new(
        body: RequestBody,
        config: FrameConfig,
        marshaller: Arc<dyn Marshaller<Req>>,
        ctx: CallContext,
    ) -> Self {
        Self {
            frames: FrameReader::with_config(body, config),
            marshaller,
            ctx,
            current: None,
            state: ReaderState::Reading,
            received: 0,
        }
    }

    /// Move to the next message.
    ///
    /// Returns `Ok(true)` when a message is available through
    /// [`current`](Self::current) and `Ok(false)` once the stream ended
    /// cleanly. Fails with `CallError::Cancelled` if the call is cancelled
    /// before or while waiting, and with a protocol error if the stream ends
    /// inside a frame or a payload does not deserialize.
    pub async fn advance(&mut self) -> Result<bool> {
        self.pull(None).await
    }

    /// Like [`advance`](Self::advance), additionally observing `token`.
    pub async fn advance_with(&mut self, token: &CancellationToken) -> Result<bool> {
        self.pull(Some(token)).await
    }

    /// Advance and take ownership of the next message.
    ///
    /// After this returns a message, `current()` has nothing to return.
    pub async fn next_message(&mut self) -> Result<Option<Req>> {
        if self.advance().await? {
            Ok(self.current.take())
        } else {
            Ok(None)
        }
    }

    /// The message produced by the last successful `advance()`.
    pub fn current(&self) -> Result<&Req> {
        self.current.as_ref().ok_or(CallError::NoCurrentMessage)
    }

    /// Number of messages produced so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Returns true once the stream ended cleanly.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, ReaderState::Finished)
    }

    async fn pull(&mut self, token: Option<&CancellationToken>) -> Result<bool> {
        match &self.state {
            ReaderState::Finished => return Ok(false),
            ReaderState::Failed(err) => return Err(err.clone()),
            ReaderState::Reading => {}
        }

        if self.ctx.is_cancelled() || token.is_some_and(CancellationToken::is_cancelled) {
            trace!("pull skipped: call cancelled");
            return Err(CallError::Cancelled);
        }

        let call_token = self.ctx.cancellation_token().clone();
        let read = tokio::select! {
            biased;
            _ = call_token.cancelled() => return Err(CallError::Cancelled),
            _ = cancelled_or_pending(token) => return Err(CallError::Cancelled),
            read = self.frames.read_frame() => read,
        };

        match read {
            Ok(Some(payload)) => match self.marshaller.deserialize(&payload) {
                Ok(message) => {
                    self.received += 1;
                    trace!(seq = self.received, len = payload.len(), "request message");
                    self.current = Some(message);
                    Ok(true)
                }
                Err(err) => {
                    warn!(method = %self.ctx.method(), error = %err, "request deserialization failed");
                    self.fail(CallError::Deserialize(Arc::new(err)))
                }
            },
            Ok(None) => {
                debug!(method = %self.ctx.method(), received = self.received, "request stream finished");
                self.state = ReaderState::Finished;
                self.current = None;
                Ok(false)
            }
            Err(FrameError::Io(err)) => {
                debug!(method = %self.ctx.method(), error = %err, "request stream terminated by transport");
                self.ctx.mark_aborted();
                self.state = ReaderState::Failed(CallError::Cancelled);
                self.current = None;
                Err(CallError::Cancelled)
            }
            Err(err) => {
                warn!(method = %self.ctx.method(), error = %err, "request framing error");
                self.fail(err.into())
            }
        }
    }

    fn fail(&mut self, err: CallError) -> Result<bool> {
        self.ctx.record_protocol_fault(err.clone());
        self.state = ReaderState::Failed(err.clone());
        self.current = None;
        Err(err)
    }
}

async fn cancelled_or_pending(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

impl<Req: 'static> std::fmt::Debug for MessageReader<Req> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageReader")
            .field("method", &self.ctx.method())
            .field("received", &self.received)
            .field("finished", &self.is_finished())
            .finish()
    }
}
