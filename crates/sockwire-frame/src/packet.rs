use std::fmt;

use bytes::Bytes;

use crate::binary::{fill_placeholders, shred};
use crate::error::{FrameError, Result};
use crate::path::DEFAULT_PATH;
use crate::value::Value;

/// Session-level packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    Error,
    BinaryEvent,
    BinaryAck,
}

impl PacketKind {
    pub fn digit(self) -> char {
        match self {
            PacketKind::Connect => '0',
            PacketKind::Disconnect => '1',
            PacketKind::Event => '2',
            PacketKind::Ack => '3',
            PacketKind::Error => '4',
            PacketKind::BinaryEvent => '5',
            PacketKind::BinaryAck => '6',
        }
    }

    pub fn from_digit(c: char) -> Option<Self> {
        Some(match c {
            '0' => PacketKind::Connect,
            '1' => PacketKind::Disconnect,
            '2' => PacketKind::Event,
            '3' => PacketKind::Ack,
            '4' => PacketKind::Error,
            '5' => PacketKind::BinaryEvent,
            '6' => PacketKind::BinaryAck,
            _ => return None,
        })
    }

    /// True for the kinds that carry out-of-band attachments.
    pub fn is_binary(self) -> bool {
        matches!(self, PacketKind::BinaryEvent | PacketKind::BinaryAck)
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketKind::Connect => "connect",
            PacketKind::Disconnect => "disconnect",
            PacketKind::Event => "event",
            PacketKind::Ack => "ack",
            PacketKind::Error => "error",
            PacketKind::BinaryEvent => "binary-event",
            PacketKind::BinaryAck => "binary-ack",
        };
        f.write_str(name)
    }
}

/// A session packet.
///
/// A decoded binary packet is partial: `data` still holds placeholders
/// until [`Packet::attach_binary`] has received `expected_binary` blobs.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: PacketKind,
    pub path: String,
    pub id: Option<u64>,
    pub data: Vec<Value>,
    pub expected_binary: usize,
    pub attachments: Vec<Bytes>,
}

/// Output of [`Packet::encode`]: the text message and the blobs that must
/// follow it, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    pub text: String,
    pub attachments: Vec<Bytes>,
}

impl Packet {
    pub fn new(kind: PacketKind, path: impl Into<String>, data: Vec<Value>, id: Option<u64>) -> Self {
        Self {
            kind,
            path: path.into(),
            id,
            data,
            expected_binary: 0,
            attachments: Vec::new(),
        }
    }

    /// An event named `event` with `items` as arguments.
    pub fn event(path: &str, event: &str, items: Vec<Value>, id: Option<u64>) -> Self {
        let mut data = Vec::with_capacity(items.len() + 1);
        data.push(Value::from(event));
        data.extend(items);
        Self::new(PacketKind::Event, path, data, id)
    }

    /// A reply to the event that carried `id`.
    pub fn ack(path: &str, items: Vec<Value>, id: u64) -> Self {
        Self::new(PacketKind::Ack, path, items, Some(id))
    }

    pub fn connect(path: &str) -> Self {
        Self::new(PacketKind::Connect, path, Vec::new(), None)
    }

    pub fn disconnect(path: &str) -> Self {
        Self::new(PacketKind::Disconnect, path, Vec::new(), None)
    }

    /// Name of an event packet (its first payload item).
    pub fn event_name(&self) -> Option<&str> {
        match self.kind {
            PacketKind::Event | PacketKind::BinaryEvent => self.data.first()?.as_str(),
            _ => None,
        }
    }

    /// True once every expected attachment has arrived.
    pub fn is_complete(&self) -> bool {
        self.attachments.len() >= self.expected_binary
    }

    /// Append the next attachment. Returns `true` when this completes the
    /// packet, at which point placeholders have been replaced by blobs.
    pub fn attach_binary(&mut self, blob: Bytes) -> Result<bool> {
        if self.is_complete() {
            return Err(FrameError::AttachmentOverflow {
                expected: self.expected_binary,
            });
        }
        self.attachments.push(blob);
        if !self.is_complete() {
            return Ok(false);
        }
        fill_placeholders(&mut self.data, &self.attachments)?;
        Ok(true)
    }

    /// Serialize to wire text, shredding blobs out of the payload.
    pub fn encode(&self) -> Result<EncodedPacket> {
        let (json, attachments) = shred(&self.data);
        let kind = match (self.kind, attachments.is_empty()) {
            (PacketKind::Event, false) => PacketKind::BinaryEvent,
            (PacketKind::Ack, false) => PacketKind::BinaryAck,
            (PacketKind::BinaryEvent, true) => PacketKind::Event,
            (PacketKind::BinaryAck, true) => PacketKind::Ack,
            (kind, _) => kind,
        };

        let mut text = String::new();
        text.push(kind.digit());
        if kind.is_binary() {
            text.push_str(&attachments.len().to_string());
            text.push('-');
        }
        if self.path != DEFAULT_PATH && !self.path.is_empty() {
            text.push_str(&self.path);
            text.push(',');
        }
        if let Some(id) = self.id {
            text.push_str(&id.to_string());
        }

        let omit_data = json.is_empty()
            && matches!(kind, PacketKind::Connect | PacketKind::Disconnect);
        if !omit_data {
            let body = match (kind, json.as_slice()) {
                (PacketKind::Error, [single]) => serde_json::to_string(single)?,
                _ => serde_json::to_string(&json)?,
            };
            text.push_str(&body);
        }

        Ok(EncodedPacket { text, attachments })
    }

    /// Parse wire text. Binary packets come back partial.
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .and_then(PacketKind::from_digit)
            .ok_or_else(|| FrameError::MalformedPacket(format!("unknown packet type in {text:?}")))?;
        let mut rest = chars.as_str();

        let mut expected_binary = 0;
        if kind.is_binary() {
            let dash = rest.find('-').ok_or_else(|| {
                FrameError::MalformedPacket(format!("missing attachment count in {text:?}"))
            })?;
            let count = &rest[..dash];
            if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
                return Err(FrameError::MalformedPacket(format!(
                    "invalid attachment count {count:?}"
                )));
            }
            expected_binary = count.parse().map_err(|_| {
                FrameError::MalformedPacket(format!("attachment count {count} out of range"))
            })?;
            rest = &rest[dash + 1..];
        }

        let mut path = DEFAULT_PATH.to_string();
        if rest.starts_with('/') {
            let end = rest.find(',').unwrap_or(rest.len());
            path = rest[..end].to_string();
            rest = rest.get(end + 1..).unwrap_or("");
        }

        // Error payloads may be bare numbers; their digits are never an id.
        let mut id = None;
        if kind != PacketKind::Error {
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            if digits > 0 {
                id = Some(rest[..digits].parse().map_err(|_| {
                    FrameError::MalformedPacket(format!("ack id {} out of range", &rest[..digits]))
                })?);
                rest = &rest[digits..];
            }
        }

        let data = if rest.is_empty() {
            Vec::new()
        } else if kind == PacketKind::Error {
            match serde_json::from_str::<serde_json::Value>(rest) {
                Ok(serde_json::Value::Array(items)) => items.into_iter().map(Value::from).collect(),
                Ok(other) => vec![Value::from(other)],
                Err(_) => vec![Value::from(rest)],
            }
        } else {
            match serde_json::from_str::<serde_json::Value>(rest) {
                Ok(serde_json::Value::Array(items)) => items.into_iter().map(Value::from).collect(),
                Ok(_) => {
                    return Err(FrameError::InvalidDataArray(format!(
                        "expected array, got {rest}"
                    )))
                }
                Err(err) => return Err(FrameError::InvalidDataArray(err.to_string())),
            }
        };

        Ok(Self {
            kind,
            path,
            id,
            data,
            expected_binary,
            attachments: Vec::new(),
        })
    }
}
