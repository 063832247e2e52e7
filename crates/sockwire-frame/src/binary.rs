//! Moving blobs out of a payload and back in.
//!
//! Placeholders are numbered in depth-first order: array elements in
//! sequence, object members in key order. Both directions walk the tree the
//! same way, so the n-th blob encountered on encode is the n-th attachment
//! on decode.

use bytes::Bytes;

use crate::error::{FrameError, Result};
use crate::value::Value;

const PLACEHOLDER_KEY: &str = "_placeholder";
const NUM_KEY: &str = "num";

/// Replace every blob in `items` with a numbered placeholder.
///
/// Returns the JSON payload and the blobs in placeholder order.
pub fn shred(items: &[Value]) -> (Vec<serde_json::Value>, Vec<Bytes>) {
    let mut blobs = Vec::new();
    let json = items
        .iter()
        .map(|item| shred_value(item, &mut blobs))
        .collect();
    (json, blobs)
}

fn shred_value(value: &Value, blobs: &mut Vec<Bytes>) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(n.clone()),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Binary(blob) => {
            let num = blobs.len();
            blobs.push(blob.clone());
            let mut marker = serde_json::Map::new();
            marker.insert(PLACEHOLDER_KEY.to_string(), serde_json::Value::Bool(true));
            marker.insert(NUM_KEY.to_string(), serde_json::Value::from(num));
            serde_json::Value::Object(marker)
        }
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| shred_value(v, blobs)).collect())
        }
        Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), shred_value(v, blobs)))
                .collect(),
        ),
    }
}

/// Replace every placeholder in `items` with its blob.
pub fn fill_placeholders(items: &mut [Value], blobs: &[Bytes]) -> Result<()> {
    for item in items {
        fill_value(item, blobs)?;
    }
    Ok(())
}

fn fill_value(value: &mut Value, blobs: &[Bytes]) -> Result<()> {
    if let Some(num) = placeholder_num(value) {
        let blob = usize::try_from(num)
            .ok()
            .and_then(|idx| blobs.get(idx))
            .ok_or(FrameError::InvalidPlaceholder {
                num,
                available: blobs.len(),
            })?;
        *value = Value::Binary(blob.clone());
        return Ok(());
    }
    match value {
        Value::Array(items) => fill_placeholders(items, blobs),
        Value::Object(map) => {
            for member in map.values_mut() {
                fill_value(member, blobs)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn placeholder_num(value: &Value) -> Option<u64> {
    let map = value.as_object()?;
    if map.get(PLACEHOLDER_KEY)?.as_bool()? {
        map.get(NUM_KEY)?.as_u64()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn nested_payload() -> Vec<Value> {
        vec![
            Value::from("upload"),
            Value::Object(BTreeMap::from([
                ("a".to_string(), Value::from(Bytes::from_static(b"first"))),
                (
                    "b".to_string(),
                    Value::Array(vec![
                        Value::from(1i64),
                        Value::from(Bytes::from_static(b"second")),
                    ]),
                ),
            ])),
            Value::from(Bytes::from_static(b"third")),
        ]
    }

    #[test]
    fn shred_numbers_blobs_depth_first() {
        let (json, blobs) = shred(&nested_payload());
        assert_eq!(
            blobs,
            vec![
                Bytes::from_static(b"first"),
                Bytes::from_static(b"second"),
                Bytes::from_static(b"third"),
            ]
        );
        assert_eq!(json[1]["a"], serde_json::json!({"_placeholder": true, "num": 0}));
        assert_eq!(json[1]["b"][1]["num"], 1);
        assert_eq!(json[2]["num"], 2);
    }

    #[test]
    fn fill_restores_shredded_payload() {
        let original = nested_payload();
        let (json, blobs) = shred(&original);
        let mut restored: Vec<Value> = json.into_iter().map(Value::from).collect();
        fill_placeholders(&mut restored, &blobs).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn fill_rejects_out_of_range_placeholder() {
        let mut items = vec![Value::from(serde_json::json!({"_placeholder": true, "num": 3}))];
        let err = fill_placeholders(&mut items, &[Bytes::from_static(b"x")]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidPlaceholder {
                num: 3,
                available: 1
            }
        ));
    }

    #[test]
    fn lookalike_objects_are_left_alone() {
        let mut items = vec![Value::from(serde_json::json!({"_placeholder": false, "num": 0}))];
        fill_placeholders(&mut items, &[]).unwrap();
        assert!(!items[0].has_binary());
    }
}
