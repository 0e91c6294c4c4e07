//! WebSocket connection source.
//!
//! The bundled [`StreamSource`] implementation: one websocket per open,
//! binary frames delivered as segments, remote close codes passed through.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{PlayerError, Result};
use crate::events::CloseCode;
use crate::source::{SourceConn, SourceEvent, StreamSource};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Connects to `ws://` / `wss://` targets.
#[derive(Debug, Default)]
pub struct WsSource;

impl WsSource {
    pub fn new() -> Self {
        Self
    }
}

fn build_request(
    target: &str,
    sub_protocol: Option<&str>,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
    let mut request = target
        .into_client_request()
        .map_err(|err| PlayerError::transport(format!("invalid target `{target}`: {err}")))?;
    if let Some(protocol) = sub_protocol {
        let value = HeaderValue::from_str(protocol).map_err(|err| {
            PlayerError::transport(format!("invalid sub-protocol `{protocol}`: {err}"))
        })?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", value);
    }
    Ok(request)
}

#[async_trait]
impl StreamSource for WsSource {
    async fn open(&self, target: &str, sub_protocol: Option<&str>) -> Result<SourceConn> {
        let request = build_request(target, sub_protocol)?;
        let (mut stream, _response) = connect_async(request)
            .await
            .map_err(|err| PlayerError::transport(format!("websocket connect failed: {err}")))?;
        debug!(%target, "websocket connected");

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let closer = CancellationToken::new();
        let task_closer = closer.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_closer.cancelled() => {
                        let _ = stream.close(None).await;
                        return;
                    }
                    message = stream.next() => match message {
                        Some(Ok(Message::Binary(payload))) => {
                            if tx.send(SourceEvent::Data(payload)).await.is_err() {
                                return;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame
                                .map(|frame| CloseCode::from(u16::from(frame.code)))
                                .unwrap_or(CloseCode::NORMAL);
                            let _ = tx.send(SourceEvent::Closed(code)).await;
                            return;
                        }
                        Some(Ok(other)) => {
                            trace!(?other, "ignoring non-binary frame");
                        }
                        Some(Err(err)) => {
                            warn!(error = %err, "websocket read error");
                            let _ = tx.send(SourceEvent::Closed(CloseCode::ABNORMAL)).await;
                            return;
                        }
                        None => {
                            let _ = tx.send(SourceEvent::Closed(CloseCode::ABNORMAL)).await;
                            return;
                        }
                    },
                }
            }
        });

        Ok(SourceConn { events: rx, closer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_sub_protocol_header() {
        let request = build_request("wss://example.com/stream", Some("binary")).unwrap();
        assert_eq!(
            request
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|value| value.to_str().ok()),
            Some("binary")
        );
    }

    #[test]
    fn request_without_sub_protocol_has_no_header() {
        let request = build_request("ws://example.com/stream", None).unwrap();
        assert!(request.headers().get("Sec-WebSocket-Protocol").is_none());
    }

    #[test]
    fn invalid_target_is_rejected() {
        assert!(build_request("not a url", None).is_err());
    }
}
