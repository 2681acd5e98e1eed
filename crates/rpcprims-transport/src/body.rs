use std::io::{self, ErrorKind};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};

enum BodyChunk {
    Data(Bytes),
    Abort,
}

/// Create an in-memory request body and the handle that feeds it.
///
/// The transport side pushes chunks through the [`BodySender`]; dropping or
/// [finishing](BodySender::finish) it signals end-of-stream and
/// [aborting](BodySender::abort) it makes the next read fail with
/// `ConnectionAborted`.
pub fn body_channel() -> (BodySender, ChunkedBody) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        BodySender { tx },
        ChunkedBody {
            rx,
            pending: Bytes::new(),
            state: BodyState::Open,
        },
    )
}

/// Transport-side handle that delivers request body chunks.
#[derive(Debug)]
pub struct BodySender {
    tx: mpsc::UnboundedSender<BodyChunk>,
}

impl BodySender {
    /// Push one chunk of request bytes.
    ///
    /// Chunk boundaries carry no meaning; a frame may span several chunks.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        trace!(len = data.len(), "request body chunk");
        self.tx
            .send(BodyChunk::Data(data))
            .map_err(|_| TransportError::Closed)
    }

    /// End the request body cleanly.
    pub fn finish(self) {
        debug!("request body finished");
    }

    /// Terminate the request stream abnormally (connection lost, reset).
    pub fn abort(self) {
        debug!("request body aborted");
        let _ = self.tx.send(BodyChunk::Abort);
    }

    /// Returns true if the reading side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for BodyChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyChunk::Data(data) => f.debug_tuple("Data").field(&data.len()).finish(),
            BodyChunk::Abort => f.write_str("Abort"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Open,
    Finished,
    Aborted,
}

/// Request body delivered as a sequence of chunks.
///
/// Implements [`AsyncRead`]; a read returns `Ok(())` with no bytes filled at
/// end-of-stream, and `ConnectionAborted` once the sender aborted.
#[derive(Debug)]
pub struct ChunkedBody {
    rx: mpsc::UnboundedReceiver<BodyChunk>,
    pending: Bytes,
    state: BodyState,
}

impl ChunkedBody {
    /// Returns true once the transport aborted the body.
    pub fn is_aborted(&self) -> bool {
        self.state == BodyState::Aborted
    }
}

impl AsyncRead for ChunkedBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending.split_to(n));
                return Poll::Ready(Ok(()));
            }

            match this.state {
                BodyState::Finished => return Poll::Ready(Ok(())),
                BodyState::Aborted => return Poll::Ready(Err(aborted())),
                BodyState::Open => {}
            }

            match ready!(this.rx.poll_recv(cx)) {
                Some(BodyChunk::Data(data)) => this.pending = data,
                Some(BodyChunk::Abort) => this.state = BodyState::Aborted,
                None => this.state = BodyState::Finished,
            }
        }
    }
}

fn aborted() -> io::Error {
    io::Error::new(ErrorKind::ConnectionAborted, "request stream aborted")
}
