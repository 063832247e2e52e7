use sockwire_frame::FrameError;
use sockwire_transport::TransportError;

/// Errors that can occur in the transport engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The open packet was missing or unusable.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A collaborator failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Packet encoding or decoding failed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The server URL could not be parsed.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// The server URL has a scheme the engine cannot use.
    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),

    /// The engine task has stopped.
    #[error("engine closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, EngineError>;
