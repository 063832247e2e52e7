//! Long-poll batching: `<len>:<packet>` repeated, where `len` counts UTF-16
//! code units.

use crate::error::{FrameError, Result};

/// Concatenate encoded engine packets into one POST body.
pub fn encode_payload<S: AsRef<str>>(packets: &[S]) -> String {
    let mut body = String::new();
    for packet in packets {
        let packet = packet.as_ref();
        body.push_str(&packet.encode_utf16().count().to_string());
        body.push(':');
        body.push_str(packet);
    }
    body
}

/// Split a poll response body into encoded engine packets.
pub fn decode_payload(body: &str) -> Result<Vec<String>> {
    let mut packets = Vec::new();
    let mut rest = body;

    while !rest.is_empty() {
        let colon = rest
            .find(':')
            .ok_or_else(|| FrameError::InvalidPayload("missing length separator".to_string()))?;
        let digits = &rest[..colon];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FrameError::InvalidPayload(format!(
                "invalid length prefix {digits:?}"
            )));
        }
        let len: usize = digits
            .parse()
            .map_err(|_| FrameError::InvalidPayload(format!("length {digits} out of range")))?;

        let content = &rest[colon + 1..];
        let mut units = 0usize;
        let mut end = 0usize;
        for (idx, ch) in content.char_indices() {
            if units >= len {
                break;
            }
            units += ch.len_utf16();
            end = idx + ch.len_utf8();
        }
        if units != len {
            return Err(FrameError::InvalidPayload(format!(
                "packet declares {len} code units, found {units}"
            )));
        }

        packets.push(content[..end].to_string());
        rest = &content[end..];
    }

    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_probe_and_upgrade() {
        assert_eq!(encode_payload(&["2probe", "5"]), "6:2probe1:5");
    }

    #[test]
    fn lengths_count_utf16_units() {
        // U+1F600 is two UTF-16 units, "é" is one.
        let body = encode_payload(&["4\u{1F600}", "4é"]);
        assert_eq!(body, "3:4\u{1F600}2:4é");
        assert_eq!(decode_payload(&body).unwrap(), vec!["4\u{1F600}", "4é"]);
    }

    #[test]
    fn decodes_empty_packets_and_bodies() {
        assert!(decode_payload("").unwrap().is_empty());
        assert_eq!(decode_payload("0:1:6").unwrap(), vec!["", "6"]);
    }

    #[test]
    fn rejects_bad_framing() {
        assert!(decode_payload("2probe").is_err());
        assert!(decode_payload("x:2").is_err());
        assert!(decode_payload("9:2probe").is_err());
        assert!(decode_payload("+1:2").is_err());
    }
}
