use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::trailers::Trailers;
use crate::traits::ResponseSink;

/// One write observed on the response side of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    /// Framed response body bytes.
    Data(Bytes),
    /// Terminal trailers.
    Trailers(Trailers),
}

/// Create an in-memory response sink and the receiver observing it.
pub fn response_channel() -> (ResponseChannel, ResponseReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ResponseChannel {
            tx,
            trailers_sent: false,
        },
        ResponseReceiver { rx },
    )
}

/// [`ResponseSink`] that forwards every write over a channel.
///
/// Rejects writes once trailers are sent.
#[derive(Debug)]
pub struct ResponseChannel {
    tx: mpsc::UnboundedSender<ResponseEvent>,
    trailers_sent: bool,
}

impl ResponseChannel {
    fn push(&self, event: ResponseEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| TransportError::Closed)
    }
}

impl ResponseSink for ResponseChannel {
    fn send_data(&mut self, data: Bytes) -> Result<()> {
        if self.trailers_sent {
            return Err(TransportError::TrailersSent);
        }
        trace!(len = data.len(), "response data");
        self.push(ResponseEvent::Data(data))
    }

    fn send_trailers(&mut self, trailers: Trailers) -> Result<()> {
        if self.trailers_sent {
            return Err(TransportError::TrailersSent);
        }
        self.trailers_sent = true;
        trace!(count = trailers.len(), "response trailers");
        self.push(ResponseEvent::Trailers(trailers))
    }
}

/// Receiving end of a [`ResponseChannel`].
#[derive(Debug)]
pub struct ResponseReceiver {
    rx: mpsc::UnboundedReceiver<ResponseEvent>,
}

/// Everything written to a response, gathered once the sink is dropped.
#[derive(Debug, Default)]
pub struct CollectedResponse {
    /// Concatenated body bytes.
    pub data: Bytes,
    /// Trailers, if any were sent.
    pub trailers: Option<Trailers>,
    /// Number of separate trailer writes observed.
    pub trailer_writes: usize,
}

impl ResponseReceiver {
    /// Receive the next response write, or `None` when the sink is gone.
    pub async fn recv(&mut self) -> Option<ResponseEvent> {
        self.rx.recv().await
    }

    /// Drain all writes until the sink is dropped.
    pub async fn collect(mut self) -> CollectedResponse {
        let mut data = BytesMut::new();
        let mut trailers = None;
        let mut trailer_writes = 0;
        while let Some(event) = self.rx.recv().await {
            match event {
                ResponseEvent::Data(chunk) => data.extend_from_slice(&chunk),
                ResponseEvent::Trailers(t) => {
                    trailer_writes += 1;
                    trailers = Some(t);
                }
            }
        }
        CollectedResponse {
            data: data.freeze(),
            trailers,
            trailer_writes,
        }
    }
}
