use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Text prefix marking a base64-encoded binary message.
pub const BASE64_BINARY_PREFIX: &str = "b4";

/// Leading byte of a binary message on the streaming socket.
pub const BINARY_MESSAGE_MARKER: u8 = 4;

/// Engine-level packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnginePacketKind {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl EnginePacketKind {
    pub fn digit(self) -> char {
        match self {
            EnginePacketKind::Open => '0',
            EnginePacketKind::Close => '1',
            EnginePacketKind::Ping => '2',
            EnginePacketKind::Pong => '3',
            EnginePacketKind::Message => '4',
            EnginePacketKind::Upgrade => '5',
            EnginePacketKind::Noop => '6',
        }
    }

    pub fn from_digit(c: char) -> Option<Self> {
        Some(match c {
            '0' => EnginePacketKind::Open,
            '1' => EnginePacketKind::Close,
            '2' => EnginePacketKind::Ping,
            '3' => EnginePacketKind::Pong,
            '4' => EnginePacketKind::Message,
            '5' => EnginePacketKind::Upgrade,
            '6' => EnginePacketKind::Noop,
            _ => return None,
        })
    }
}

/// One engine packet: a type and its (possibly empty) text data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePacket {
    pub kind: EnginePacketKind,
    pub data: String,
}

impl EnginePacket {
    pub fn new(kind: EnginePacketKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 1);
        out.push(self.kind.digit());
        out.push_str(&self.data);
        out
    }
}

/// A decoded text message: either a packet or base64 binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    Packet(EnginePacket),
    Binary(Bytes),
}

/// Decode one text message from either transport.
pub fn decode_engine_text(text: &str) -> Result<EngineMessage> {
    if let Some(encoded) = text.strip_prefix(BASE64_BINARY_PREFIX) {
        return Ok(EngineMessage::Binary(Bytes::from(STANDARD.decode(encoded)?)));
    }

    let mut chars = text.chars();
    let kind = chars
        .next()
        .and_then(EnginePacketKind::from_digit)
        .ok_or_else(|| FrameError::MalformedPacket(format!("unknown engine packet {text:?}")))?;
    Ok(EngineMessage::Packet(EnginePacket::new(kind, chars.as_str())))
}

/// Encode a blob as a `b4` text message for the long-poll transport.
pub fn encode_base64_binary(blob: &[u8]) -> String {
    let mut out = String::from(BASE64_BINARY_PREFIX);
    STANDARD.encode_string(blob, &mut out);
    out
}

/// Prefix a blob with the binary message marker for the streaming socket.
pub fn with_binary_marker(blob: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(blob.len() + 1);
    buf.put_u8(BINARY_MESSAGE_MARKER);
    buf.put_slice(blob);
    buf.freeze()
}

/// Remove the binary message marker from an inbound socket frame.
pub fn strip_binary_marker(frame: Bytes) -> Bytes {
    if frame.first() == Some(&BINARY_MESSAGE_MARKER) {
        frame.slice(1..)
    } else {
        frame
    }
}
