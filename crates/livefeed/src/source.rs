//! Connection source seam.
//!
//! The player never creates transports directly; it asks a [`StreamSource`]
//! to open one. A source only has to deliver opaque binary messages and a
//! close notification; it knows nothing about media semantics, buffering,
//! or reconnection.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::events::CloseCode;

/// Events delivered by an open connection, in receive order.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// One opaque binary message.
    Data(Bytes),
    /// The connection ended. Delivered at most once, as the last event.
    Closed(CloseCode),
}

/// Handle to one open connection.
///
/// Dropping the handle or cancelling `closer` force-closes the transport;
/// the implementation must stop delivering events promptly after that.
#[derive(Debug)]
pub struct SourceConn {
    /// Ordered event stream for this connection.
    pub events: mpsc::Receiver<SourceEvent>,
    /// Synchronous force-close. Cancelling suppresses any further events.
    pub closer: CancellationToken,
}

impl SourceConn {
    pub fn force_close(&self) {
        self.closer.cancel();
    }
}

/// Factory for connections to a remote stream.
///
/// `open` resolving `Ok` is the "transport open" point; whether the remote
/// ever sends data afterwards is a separate question the player tracks via
/// its liveness timer.
#[async_trait]
pub trait StreamSource: Send + Sync + 'static {
    async fn open(&self, target: &str, sub_protocol: Option<&str>) -> Result<SourceConn>;
}
