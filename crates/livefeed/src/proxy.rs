//! Connection proxy.
//!
//! Owns one connection lifecycle: opens it through a [`StreamSource`],
//! relays its messages into the player's dispatch loop, and watches
//! liveness. If the remote stays silent past the liveness timeout the
//! proxy forcibly closes the connection and reports an ordinary close:
//! the player cannot tell a stalled connection from a remote close, and
//! both require the same recovery.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PlayerError;
use crate::events::CloseCode;
use crate::player::Event;
use crate::source::{SourceEvent, StreamSource};

/// Connection-side events entering the player loop.
#[derive(Debug, Clone)]
pub(crate) enum ConnEvent {
    /// Transport finished opening.
    Open,
    /// One opaque segment.
    Data(Bytes),
    /// The connection ended: remote close, transport error, failed open,
    /// or liveness expiry. At most one per proxy.
    Closed(CloseCode),
}

/// Handle to a spawned proxy task.
///
/// `close` silences the proxy: the transport is force-closed and no close
/// notification is emitted (the caller already knows). Events from an
/// earlier epoch are dropped by the player, so a closed proxy can never
/// re-enter its state.
#[derive(Debug)]
pub(crate) struct ConnectionProxy {
    cancel: CancellationToken,
}

impl ConnectionProxy {
    /// Force-close the connection and suppress its close notification.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Open a connection and relay its events, tagged with `epoch`, into
    /// the player channel. Returns immediately; the open itself runs on
    /// the spawned task.
    pub fn spawn(
        source: Arc<dyn StreamSource>,
        target: String,
        sub_protocol: Option<String>,
        liveness_timeout: Duration,
        epoch: u64,
        tx: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let emit = |event: ConnEvent| {
                let _ = tx.send(Event::Conn { epoch, event });
            };

            let conn = tokio::select! {
                _ = task_cancel.cancelled() => return,
                result = source.open(&target, sub_protocol.as_deref()) => match result {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!(%target, error = %err, "connection open failed");
                        emit(ConnEvent::Closed(CloseCode::ABNORMAL));
                        return;
                    }
                },
            };

            debug!(%target, "connection open");
            emit(ConnEvent::Open);

            let mut events = conn.events;
            let closer = conn.closer;
            // Armed at open; every received message pushes it forward.
            let mut deadline = Instant::now() + liveness_timeout;

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        closer.cancel();
                        return;
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        let err = PlayerError::Liveness {
                            idle_ms: liveness_timeout.as_millis() as u64,
                        };
                        warn!(%target, error = %err, "liveness timeout, forcing close");
                        closer.cancel();
                        emit(ConnEvent::Closed(CloseCode::ABNORMAL));
                        return;
                    }
                    event = events.recv() => match event {
                        Some(SourceEvent::Data(bytes)) => {
                            deadline = Instant::now() + liveness_timeout;
                            emit(ConnEvent::Data(bytes));
                        }
                        Some(SourceEvent::Closed(code)) => {
                            debug!(%target, code = code.0, "connection closed by source");
                            emit(ConnEvent::Closed(code));
                            return;
                        }
                        None => {
                            emit(ConnEvent::Closed(CloseCode::ABNORMAL));
                            return;
                        }
                    },
                }
            }
        });

        Self { cancel }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlayerError;
    use crate::source::SourceConn;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct OneShotSource {
        conn: Mutex<Option<SourceConn>>,
    }

    #[async_trait]
    impl StreamSource for OneShotSource {
        async fn open(&self, _target: &str, _sub_protocol: Option<&str>) -> crate::Result<SourceConn> {
            self.conn
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| PlayerError::transport("no connection scripted"))
        }
    }

    fn scripted_conn() -> (mpsc::Sender<SourceEvent>, Arc<OneShotSource>) {
        let (tx, rx) = mpsc::channel(16);
        let conn = SourceConn {
            events: rx,
            closer: CancellationToken::new(),
        };
        let source = Arc::new(OneShotSource {
            conn: Mutex::new(Some(conn)),
        });
        (tx, source)
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_expiry_reports_abnormal_close() {
        let (data_tx, source) = scripted_conn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _proxy = ConnectionProxy::spawn(
            source,
            "wss://example/stream".into(),
            None,
            Duration::from_secs(60),
            1,
            tx,
        );

        match rx.recv().await {
            Some(Event::Conn {
                event: ConnEvent::Open,
                ..
            }) => {}
            other => panic!("expected open, got {other:?}"),
        }

        // A message inside the window rearms the deadline.
        tokio::time::sleep(Duration::from_secs(50)).await;
        data_tx
            .send(SourceEvent::Data(Bytes::from_static(b"segment")))
            .await
            .unwrap();
        match rx.recv().await {
            Some(Event::Conn {
                event: ConnEvent::Data(_),
                ..
            }) => {}
            other => panic!("expected data, got {other:?}"),
        }

        // Silence past the rearmed deadline forces a close.
        tokio::time::sleep(Duration::from_secs(61)).await;
        match rx.recv().await {
            Some(Event::Conn {
                event: ConnEvent::Closed(code),
                ..
            }) => assert_eq!(code, CloseCode::ABNORMAL),
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_close_emits_nothing_further() {
        let (_data_tx, source) = scripted_conn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let proxy = ConnectionProxy::spawn(
            source,
            "wss://example/stream".into(),
            None,
            Duration::from_secs(60),
            1,
            tx,
        );

        match rx.recv().await {
            Some(Event::Conn {
                event: ConnEvent::Open,
                ..
            }) => {}
            other => panic!("expected open, got {other:?}"),
        }

        proxy.close();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err(), "closed proxy must stay silent");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_open_counts_as_abnormal_close() {
        let source = Arc::new(OneShotSource {
            conn: Mutex::new(None),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _proxy = ConnectionProxy::spawn(
            source,
            "wss://example/stream".into(),
            None,
            Duration::from_secs(60),
            7,
            tx,
        );

        match rx.recv().await {
            Some(Event::Conn {
                epoch,
                event: ConnEvent::Closed(code),
            }) => {
                assert_eq!(epoch, 7);
                assert_eq!(code, CloseCode::ABNORMAL);
            }
            other => panic!("expected close, got {other:?}"),
        }
    }
}
