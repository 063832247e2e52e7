/// Errors produced while encoding or decoding packets.
///
/// None of these are fatal to a connection: callers log and drop the
/// offending packet.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The text does not follow the packet grammar.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// The JSON segment is missing, unparseable or not an array.
    #[error("invalid data array: {0}")]
    InvalidDataArray(String),

    /// A long-poll body does not follow `<len>:<packet>` framing.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A `b4` message carried invalid base64.
    #[error("invalid base64 binary: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// A placeholder points past the attached blobs.
    #[error("placeholder {num} out of range ({available} attachments)")]
    InvalidPlaceholder { num: u64, available: usize },

    /// A blob was attached to a packet that was already complete.
    #[error("packet already has all {expected} attachments")]
    AttachmentOverflow { expected: usize },

    /// A binary value was found where only JSON is allowed.
    #[error("binary value cannot be represented as JSON")]
    UnexpectedBinary,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
