use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rpcprims_transport::{ResponseSink, Trailers};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CallError, Result};
use crate::status::{is_reserved_trailer, Status};

/// Per-call state shared by the handler, the message reader and the executor.
///
/// Cloning is cheap; all clones observe the same call.
#[derive(Clone)]
pub struct CallContext {
    inner: Arc<CallState>,
}

struct CallState {
    method: String,
    deadline: Option<Instant>,
    token: CancellationToken,
    parent: Option<CancellationToken>,
    aborted: AtomicBool,
    completed: AtomicBool,
    protocol_fault: Mutex<Option<CallError>>,
    trailers: Mutex<Trailers>,
}

/// Builder for [`CallContext`].
#[derive(Debug)]
pub struct CallContextBuilder {
    method: String,
    deadline: Option<Instant>,
    parent: Option<CancellationToken>,
}

impl CallContextBuilder {
    /// Deadline propagated by the host. Carried only; the core enforces no timeout.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Link an external cancellation source (deadline timer, host shutdown).
    pub fn parent(mut self, token: CancellationToken) -> Self {
        self.parent = Some(token);
        self
    }

    pub fn build(self) -> CallContext {
        let token = match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        CallContext {
            inner: Arc::new(CallState {
                method: self.method,
                deadline: self.deadline,
                token,
                parent: self.parent,
                aborted: AtomicBool::new(false),
                completed: AtomicBool::new(false),
                protocol_fault: Mutex::new(None),
                trailers: Mutex::new(Trailers::new()),
            }),
        }
    }
}

impl CallContext {
    /// Context for one call to `method` with no deadline or parent.
    pub fn new(method: impl Into<String>) -> Self {
        Self::builder(method).build()
    }

    pub fn builder(method: impl Into<String>) -> CallContextBuilder {
        CallContextBuilder {
            method: method.into(),
            deadline: None,
            parent: None,
        }
    }

    /// Method path of this call.
    pub fn method(&self) -> &str {
        &self.inner.method
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Token cancelled when the call is cancelled by anyone.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Cancel the call. Idempotent.
    ///
    /// A handler may cancel to stop reading early; returning a response
    /// afterwards still completes the call successfully.
    pub fn cancel(&self) {
        if !self.inner.token.is_cancelled() {
            debug!(method = %self.inner.method, "call cancelled by handler");
        }
        self.inner.token.cancel();
    }

    /// Wait until the call is cancelled.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// Returns true if the transport or the parent source cancelled the call.
    pub fn is_cancelled_externally(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
    }

    /// Returns true once the final status has been written.
    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Buffer a custom trailer for the final status.
    ///
    /// Returns false if the key is reserved or the call already completed.
    pub fn add_response_trailer(&self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if is_reserved_trailer(&key) {
            debug!(%key, "ignoring reserved response trailer");
            return false;
        }
        if self.is_completed() {
            debug!(%key, "ignoring response trailer after completion");
            return false;
        }
        lock(&self.inner.trailers).insert(key, value);
        true
    }

    /// Write the final status as trailers. Write-once.
    ///
    /// Buffered custom trailers are appended after the status trailers.
    /// Every call after the first returns `CallError::AlreadyCompleted`
    /// without touching the sink.
    pub fn complete<S: ResponseSink + ?Sized>(&self, status: &Status, sink: &mut S) -> Result<()> {
        if self.inner.completed.swap(true, Ordering::AcqRel) {
            warn!(method = %self.inner.method, "call completion attempted twice");
            return Err(CallError::AlreadyCompleted);
        }

        let mut final_status = status.clone();
        for (key, value) in lock(&self.inner.trailers).iter() {
            final_status.insert_metadata(key, value);
        }

        sink.send_trailers(final_status.to_trailers())?;
        Ok(())
    }

    /// Transport terminated the request stream.
    pub(crate) fn mark_aborted(&self) {
        self.inner.aborted.store(true, Ordering::Release);
        self.inner.token.cancel();
    }

    /// Record the first protocol fault seen on the request stream.
    pub(crate) fn record_protocol_fault(&self, err: CallError) {
        let mut slot = lock(&self.inner.protocol_fault);
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Take the recorded protocol fault, if any.
    pub(crate) fn take_protocol_fault(&self) -> Option<CallError> {
        lock(&self.inner.protocol_fault).take()
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("method", &self.inner.method)
            .field("deadline", &self.inner.deadline)
            .field("cancelled", &self.is_cancelled())
            .field("completed", &self.is_completed())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
