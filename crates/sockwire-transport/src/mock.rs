//! Scripted in-memory collaborators for tests.
//!
//! [`MockHttp`] behaves like a long-poll server: every `GET` parks until the
//! test queues a reply, every `POST` body is captured. [`MockConnector`] hands
//! the test the server side of each streaming socket the engine opens.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};
use crate::traits::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, SocketConnector, SocketEvent, SocketFrame,
    SocketLink, SocketRequest,
};

#[derive(Debug)]
enum PollReply {
    Body(String),
    Status(u16),
    Error(String),
}

#[derive(Debug)]
struct MockHttpInner {
    refuse: bool,
    polls_tx: mpsc::UnboundedSender<PollReply>,
    polls_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<PollReply>>,
    posts_tx: mpsc::UnboundedSender<String>,
    posts_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    post_status: Mutex<u16>,
    requests: Mutex<Vec<HttpRequest>>,
    gets_in_flight: AtomicUsize,
    overlapping_gets: AtomicBool,
}

/// Scripted long-poll server.
#[derive(Debug, Clone)]
pub struct MockHttp {
    inner: Arc<MockHttpInner>,
}

impl MockHttp {
    /// A server that answers polls from the queued script.
    pub fn new() -> Self {
        Self::build(false)
    }

    /// A server that refuses every request, like a closed port.
    pub fn refusing() -> Self {
        Self::build(true)
    }

    fn build(refuse: bool) -> Self {
        let (polls_tx, polls_rx) = mpsc::unbounded_channel();
        let (posts_tx, posts_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MockHttpInner {
                refuse,
                polls_tx,
                polls_rx: tokio::sync::Mutex::new(polls_rx),
                posts_tx,
                posts_rx: tokio::sync::Mutex::new(posts_rx),
                post_status: Mutex::new(200),
                requests: Mutex::new(Vec::new()),
                gets_in_flight: AtomicUsize::new(0),
                overlapping_gets: AtomicBool::new(false),
            }),
        }
    }

    /// Queue a raw poll response body.
    pub fn push_body(&self, body: impl Into<String>) {
        let _ = self.inner.polls_tx.send(PollReply::Body(body.into()));
    }

    /// Queue a poll response carrying the given engine packets, each framed
    /// as `<utf16-len>:<packet>`.
    pub fn push_packets(&self, packets: &[&str]) {
        let body = packets
            .iter()
            .map(|p| format!("{}:{}", p.encode_utf16().count(), p))
            .collect::<String>();
        self.push_body(body);
    }

    /// Queue a poll response with an error status.
    pub fn push_status(&self, status: u16) {
        let _ = self.inner.polls_tx.send(PollReply::Status(status));
    }

    /// Queue a poll that fails at the HTTP layer.
    pub fn push_error(&self, message: impl Into<String>) {
        let _ = self.inner.polls_tx.send(PollReply::Error(message.into()));
    }

    /// Status returned for subsequent POSTs.
    pub fn set_post_status(&self, status: u16) {
        if let Ok(mut guard) = self.inner.post_status.lock() {
            *guard = status;
        }
    }

    /// Wait for the next POST body.
    pub async fn next_post(&self) -> Option<String> {
        self.inner.posts_rx.lock().await.recv().await
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner
            .requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests().len()
    }

    pub fn get_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == HttpMethod::Get)
            .count()
    }

    /// True if two GETs were ever outstanding at the same time.
    pub fn saw_overlapping_polls(&self) -> bool {
        self.inner.overlapping_gets.load(Ordering::SeqCst)
    }
}

impl Default for MockHttp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttp {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        if let Ok(mut guard) = self.inner.requests.lock() {
            guard.push(request.clone());
        }
        if self.inner.refuse {
            return Err(TransportError::Request("connection refused".to_string()));
        }

        match request.method {
            HttpMethod::Get => {
                if self.inner.gets_in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                    self.inner.overlapping_gets.store(true, Ordering::SeqCst);
                }
                let reply = self.inner.polls_rx.lock().await.recv().await;
                self.inner.gets_in_flight.fetch_sub(1, Ordering::SeqCst);
                match reply {
                    Some(PollReply::Body(body)) => Ok(HttpResponse::ok(body)),
                    Some(PollReply::Status(status)) => Ok(HttpResponse {
                        status,
                        body: Bytes::new(),
                    }),
                    Some(PollReply::Error(message)) => Err(TransportError::Request(message)),
                    None => Err(TransportError::Closed),
                }
            }
            HttpMethod::Post => {
                let body = request
                    .body
                    .map(|b| String::from_utf8_lossy(&b).into_owned())
                    .unwrap_or_default();
                let _ = self.inner.posts_tx.send(body);
                let status = self.inner.post_status.lock().map(|g| *g).unwrap_or(200);
                Ok(HttpResponse {
                    status,
                    body: Bytes::from_static(b"ok"),
                })
            }
        }
    }
}

/// Server side of a streaming socket opened through [`MockConnector`].
#[derive(Debug)]
pub struct MockSocketPeer {
    pub request: SocketRequest,
    pub from_client: mpsc::UnboundedReceiver<SocketFrame>,
    pub to_client: mpsc::UnboundedSender<SocketEvent>,
}

impl MockSocketPeer {
    /// Next frame written by the client, `None` once the client drops the link.
    pub async fn next_frame(&mut self) -> Option<SocketFrame> {
        self.from_client.recv().await
    }

    /// Next text frame, skipping binary frames.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            match self.from_client.recv().await? {
                SocketFrame::Text(text) => return Some(text),
                SocketFrame::Binary(_) => continue,
                SocketFrame::Close => return None,
            }
        }
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(SocketEvent::Text(text.into()));
    }

    pub fn send_binary(&self, data: impl Into<Bytes>) {
        let _ = self.to_client.send(SocketEvent::Binary(data.into()));
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(SocketEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }
}

#[derive(Debug)]
struct MockConnectorInner {
    accept: bool,
    attempts: AtomicUsize,
    peers_tx: mpsc::UnboundedSender<MockSocketPeer>,
    peers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockSocketPeer>>,
}

/// Streaming-socket connector whose server side is driven by the test.
#[derive(Debug, Clone)]
pub struct MockConnector {
    inner: Arc<MockConnectorInner>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::build(true)
    }

    /// A connector whose every connection attempt fails.
    pub fn refusing() -> Self {
        Self::build(false)
    }

    fn build(accept: bool) -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MockConnectorInner {
                accept,
                attempts: AtomicUsize::new(0),
                peers_tx,
                peers_rx: tokio::sync::Mutex::new(peers_rx),
            }),
        }
    }

    /// Wait for the next socket the client opens.
    pub async fn accept(&self) -> Option<MockSocketPeer> {
        self.inner.peers_rx.lock().await.recv().await
    }

    pub fn attempt_count(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SocketConnector for MockConnector {
    async fn connect(&self, request: SocketRequest) -> Result<SocketLink> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.inner.accept {
            return Err(TransportError::Connect {
                url: request.url,
                reason: "connection refused".to_string(),
            });
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let peer = MockSocketPeer {
            request,
            from_client: outbound_rx,
            to_client: inbound_tx,
        };
        self.inner
            .peers_tx
            .send(peer)
            .map_err(|_| TransportError::Closed)?;

        Ok(SocketLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
