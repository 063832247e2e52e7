//! Wire codecs for both protocol layers.
//!
//! Engine packets are a single type digit followed by data. Session packets
//! travel inside engine `message` packets and look like:
//!
//! ```text
//! <kind>[<attachments>-][<path>,][<ack id>][<json array>]
//! ```
//!
//! Binary blobs never appear inline. On encode they are replaced by
//! `{"_placeholder":true,"num":i}` markers and returned alongside the text;
//! on decode a binary packet stays partial until its blobs are attached.

pub mod binary;
pub mod engine;
pub mod error;
pub mod packet;
pub mod path;
pub mod payload;
pub mod value;

pub use binary::{fill_placeholders, shred};
pub use engine::{
    decode_engine_text, encode_base64_binary, strip_binary_marker, with_binary_marker,
    EngineMessage, EnginePacket, EnginePacketKind, BASE64_BINARY_PREFIX, BINARY_MESSAGE_MARKER,
};
pub use error::{FrameError, Result};
pub use packet::{EncodedPacket, Packet, PacketKind};
pub use path::{normalize_path, DEFAULT_PATH};
pub use payload::{decode_payload, encode_payload};
pub use value::Value;
