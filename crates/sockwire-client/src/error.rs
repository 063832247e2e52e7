use std::time::Duration;

use sockwire_engine::EngineError;
use sockwire_frame::FrameError;
use sockwire_transport::TransportError;

/// Errors that can occur in the session layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The configuration is contradictory or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid configuration json: {0}")]
    Json(#[from] serde_json::Error),

    /// No acknowledgement arrived in time.
    #[error("no acknowledgement within {0:?}")]
    AckTimeout(Duration),

    /// The pending acknowledgement was dropped (session torn down or the
    /// emit was refused).
    #[error("acknowledgement dropped before a reply arrived")]
    AckDropped,

    /// The session gave up or was told to disconnect before reaching
    /// `connected`.
    #[error("session disconnected before connecting")]
    Disconnected,

    /// The session task has stopped.
    #[error("session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
