//! `tokio-tungstenite` implementation of [`SocketConnector`].
//!
//! Each connection is split into a writer task (drains the link's outbound
//! channel into the sink) and a reader task (forwards frames as
//! [`SocketEvent`]s). A shared cancellation token stops the writer when the
//! reader observes the socket going away.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{tungstenite, Connector};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};
use crate::socket_tls::client_config;
use crate::tls::TlsPolicy;
use crate::traits::{SocketConnector, SocketEvent, SocketFrame, SocketLink, SocketRequest};

/// Close code reported when the stream ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// WebSocket connector built on `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector {
    /// `None` keeps the bundled webpki-root verification.
    tls_config: Option<Arc<rustls::ClientConfig>>,
}

impl TungsteniteConnector {
    /// A connector with default root verification.
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector applying the given certificate policy to `wss://` URLs.
    pub fn with_tls(tls: &TlsPolicy) -> Result<Self> {
        Ok(Self {
            tls_config: client_config(tls)?,
        })
    }
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(&self, request: SocketRequest) -> Result<SocketLink> {
        use tungstenite::client::IntoClientRequest;

        if request.compress {
            tracing::debug!("per-message compression not available; continuing uncompressed");
        }

        let mut client_request =
            request
                .url
                .as_str()
                .into_client_request()
                .map_err(|err| TransportError::Connect {
                    url: request.url.clone(),
                    reason: err.to_string(),
                })?;

        for (name, value) in &request.headers {
            let header_name = tungstenite::http::HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidHeader { name: name.clone() })?;
            let header_value = tungstenite::http::HeaderValue::from_str(value)
                .map_err(|_| TransportError::InvalidHeader { name: name.clone() })?;
            client_request
                .headers_mut()
                .insert(header_name, header_value);
        }

        let connector = self.tls_config.clone().map(Connector::Rustls);
        let (ws_stream, _response) =
            tokio_tungstenite::connect_async_tls_with_config(client_request, None, false, connector)
                .await
            .map_err(|err| TransportError::Connect {
                url: request.url.clone(),
                reason: err.to_string(),
            })?;

        let (mut sink, mut stream) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<SocketFrame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<SocketEvent>();
        let cancel = CancellationToken::new();

        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = writer_cancel.cancelled() => break,
                    frame = outbound_rx.recv() => frame,
                };
                let message = match frame {
                    Some(SocketFrame::Text(text)) => tungstenite::Message::Text(text),
                    Some(SocketFrame::Binary(data)) => tungstenite::Message::Binary(data.to_vec()),
                    Some(SocketFrame::Close) | None => {
                        let _ = sink.send(tungstenite::Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(err) = sink.send(message).await {
                    tracing::debug!(error = %err, "websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            loop {
                let event = match stream.next().await {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        SocketEvent::Text(text.to_string())
                    }
                    Some(Ok(tungstenite::Message::Binary(data))) => {
                        SocketEvent::Binary(Bytes::from(data))
                    }
                    Some(Ok(tungstenite::Message::Close(close_frame))) => {
                        let (code, reason) = close_frame
                            .map(|cf| (cf.code.into(), cf.reason.to_string()))
                            .unwrap_or((1005, String::new()));
                        let _ = inbound_tx.send(SocketEvent::Closed { code, reason });
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        let _ = inbound_tx.send(SocketEvent::Error(err.to_string()));
                        break;
                    }
                    None => {
                        let _ = inbound_tx.send(SocketEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: String::new(),
                        });
                        break;
                    }
                };
                if inbound_tx.send(event).is_err() {
                    break;
                }
            }
            cancel.cancel();
        });

        Ok(SocketLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> SocketRequest {
        SocketRequest {
            url: url.to_string(),
            headers: Vec::new(),
            compress: false,
        }
    }

    #[tokio::test]
    async fn invalid_url_is_connect_error() {
        let err = TungsteniteConnector::default()
            .connect(request("not-a-url"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_connect_error() {
        let err = TungsteniteConnector::default()
            .connect(request("ws://127.0.0.1:1/socket.io/"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[tokio::test]
    async fn custom_tls_on_secure_socket_attempts_connection() {
        let connector = TungsteniteConnector::with_tls(&TlsPolicy::AcceptInvalidCerts).unwrap();
        let err = connector
            .connect(request("wss://127.0.0.1:1/socket.io/"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[test]
    fn garbage_pinned_certificate_is_rejected_up_front() {
        let tls = TlsPolicy::Pinned {
            certificates: vec!["-----BEGIN nothing".to_string()],
        };
        assert!(TungsteniteConnector::with_tls(&tls).is_err());
    }

    #[tokio::test]
    async fn invalid_header_rejected() {
        let mut req = request("ws://127.0.0.1:1/socket.io/");
        req.headers.push(("bad header".to_string(), "x".to_string()));
        let err = TungsteniteConnector::default()
            .connect(req)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidHeader { .. }));
    }
}
