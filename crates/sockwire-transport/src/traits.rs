use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// HTTP method used by the long-poll transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A single long-poll round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

/// The part of an HTTP response the engine consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    /// Build a `200 OK` response with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Asynchronous HTTP collaborator.
///
/// Implementations own connection pooling and TLS; the engine only issues
/// one request at a time per direction and treats any `Err` or non-2xx
/// status as a transport failure.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Parameters for opening a streaming socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Ask for per-message compression when the implementation supports it.
    pub compress: bool,
}

/// Outbound frame written to a streaming socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketFrame {
    Text(String),
    Binary(Bytes),
    /// Send a close frame and stop writing.
    Close,
}

/// Inbound notification from a streaming socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Text(String),
    Binary(Bytes),
    Closed { code: u16, reason: String },
    Error(String),
}

/// An open streaming socket.
///
/// Dropping `outbound` asks the implementation to close the socket. The
/// implementation ends `inbound` (after a `Closed` or `Error` event) when the
/// socket goes away.
pub struct SocketLink {
    pub outbound: mpsc::UnboundedSender<SocketFrame>,
    pub inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

impl fmt::Debug for SocketLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketLink")
            .field("outbound_closed", &self.outbound.is_closed())
            .finish_non_exhaustive()
    }
}

/// Streaming-socket collaborator. A successful `connect` is the "open" event.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, request: SocketRequest) -> Result<SocketLink>;
}

/// The pair of collaborators an engine is built from.
#[derive(Clone)]
pub struct Transports {
    pub http: Arc<dyn HttpClient>,
    pub socket: Arc<dyn SocketConnector>,
}

impl Transports {
    pub fn new(http: Arc<dyn HttpClient>, socket: Arc<dyn SocketConnector>) -> Self {
        Self { http, socket }
    }

    /// `reqwest` for polling and `tokio-tungstenite` for the streaming socket.
    #[cfg(all(feature = "reqwest", feature = "websocket"))]
    pub fn native(tls: &crate::tls::TlsPolicy) -> Result<Self> {
        let http = crate::reqwest_client::ReqwestHttpClient::with_tls(tls)?;
        let socket = crate::websocket::TungsteniteConnector::with_tls(tls)?;
        Ok(Self::new(Arc::new(http), Arc::new(socket)))
    }
}

impl fmt::Debug for Transports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transports").finish_non_exhaustive()
    }
}
