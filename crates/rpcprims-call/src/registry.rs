use std::collections::HashMap;
use std::sync::Arc;

use rpcprims_transport::ResponseSink;
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::error::{CallError, Result};
use crate::executor::ClientStreamingExecutor;
use crate::handler::BoxFuture;
use crate::reader::RequestBody;
use crate::status::{Status, UNIMPLEMENTED_MESSAGE};

/// A registered method with its message types erased.
pub trait ServerMethod: Send + Sync {
    /// Method path, e.g. `/count.Counter/AccumulateCount`.
    fn path(&self) -> &str;

    /// Run one call against this method.
    fn call<'a>(
        &'a self,
        body: RequestBody,
        sink: &'a mut dyn ResponseSink,
        ctx: CallContext,
    ) -> BoxFuture<'a, Status>;
}

impl<Req, Resp> ServerMethod for ClientStreamingExecutor<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn path(&self) -> &str {
        self.method()
    }

    fn call<'a>(
        &'a self,
        body: RequestBody,
        sink: &'a mut dyn ResponseSink,
        ctx: CallContext,
    ) -> BoxFuture<'a, Status> {
        Box::pin(self.run(body, sink, ctx))
    }
}

/// Maps method paths to registered methods.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Arc<dyn ServerMethod>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method under its own path.
    pub fn register(&mut self, method: impl ServerMethod + 'static) -> Result<&mut Self> {
        let path = method.path().to_string();
        if self.methods.contains_key(&path) {
            return Err(CallError::DuplicateMethod(path));
        }
        debug!(%path, "registered method");
        self.methods.insert(path, Arc::new(method));
        Ok(self)
    }

    /// Look up a method by path.
    pub fn lookup(&self, path: &str) -> Option<Arc<dyn ServerMethod>> {
        self.methods.get(path).cloned()
    }

    /// Registered paths, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Route one call by path.
    ///
    /// Unknown paths complete with UNIMPLEMENTED without reading the body.
    pub async fn dispatch(
        &self,
        path: &str,
        body: RequestBody,
        sink: &mut dyn ResponseSink,
        ctx: CallContext,
    ) -> Status {
        match self.lookup(path) {
            Some(method) => method.call(body, sink, ctx).await,
            None => {
                warn!(%path, "no method registered for path");
                let status = Status::unimplemented(UNIMPLEMENTED_MESSAGE);
                if let Err(err) = ctx.complete(&status, sink) {
                    warn!(%path, error = %err, "failed to write call trailers");
                }
                status
            }
        }
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}
