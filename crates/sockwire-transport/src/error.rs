/// Errors reported by transport collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request could not be completed (DNS, connect, I/O, TLS).
    #[error("http request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("unexpected http status {status}")]
    Status { status: u16 },

    /// The streaming socket could not be opened.
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The streaming socket failed after it was opened.
    #[error("socket error: {0}")]
    Socket(String),

    /// A header name or value could not be represented on the wire.
    #[error("invalid header {name}")]
    InvalidHeader { name: String },

    /// The requested option is not supported by this collaborator.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The collaborator has been shut down.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
