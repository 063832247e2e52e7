use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::error::{FrameError, Result};

/// A payload item: JSON extended with binary blobs.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Binary(Bytes),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Convert any serializable value. The result never contains binary.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(serde_json::to_value(value)?.into())
    }

    /// Convert to plain JSON. Fails if the tree holds binary.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Binary(_) => return Err(FrameError::UnexpectedBinary),
            Value::Array(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Result<_>>()?,
            ),
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, value) in map {
                    out.insert(key.clone(), value.to_json()?);
                }
                serde_json::Value::Object(out)
            }
        })
    }

    /// True if a blob appears anywhere in the tree.
    pub fn has_binary(&self) -> bool {
        match self {
            Value::Binary(_) => true,
            Value::Array(items) => items.iter().any(Value::has_binary),
            Value::Object(map) => map.values().any(Value::has_binary),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// JSON rendering with blobs summarised as `"<binary N bytes>"`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn summarise(value: &Value) -> serde_json::Value {
            match value {
                Value::Binary(b) => serde_json::Value::String(format!("<binary {} bytes>", b.len())),
                Value::Array(items) => {
                    serde_json::Value::Array(items.iter().map(summarise).collect())
                }
                Value::Object(map) => serde_json::Value::Object(
                    map.iter().map(|(k, v)| (k.clone(), summarise(v))).collect(),
                ),
                other => other.to_json().unwrap_or(serde_json::Value::Null),
            }
        }
        write!(f, "{}", summarise(self))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

/// Non-finite floats have no JSON form and become `Null`.
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Binary(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(Bytes::from(b))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_conversion_preserves_structure() {
        let json = serde_json::json!({"a": [1, "two", null, true], "b": {"c": 2.5}});
        let value = Value::from(json.clone());
        assert!(!value.has_binary());
        assert_eq!(value.to_json().unwrap(), json);
    }

    #[test]
    fn binary_is_detected_and_rejected_as_json() {
        let value = Value::Array(vec![
            Value::from("x"),
            Value::Object(BTreeMap::from([(
                "blob".to_string(),
                Value::from(vec![1u8, 2, 3]),
            )])),
        ]);
        assert!(value.has_binary());
        assert!(matches!(
            value.to_json(),
            Err(FrameError::UnexpectedBinary)
        ));
    }

    #[test]
    fn display_summarises_binary() {
        let value = Value::Array(vec![Value::from("file"), Value::from(vec![0u8; 4])]);
        assert_eq!(value.to_string(), r#"["file","<binary 4 bytes>"]"#);
    }

    #[test]
    fn from_serialize_and_accessors() {
        #[derive(Serialize)]
        struct Msg {
            text: &'static str,
            n: u32,
        }
        let value = Value::from_serialize(&Msg { text: "hi", n: 7 }).unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map["text"].as_str(), Some("hi"));
        assert_eq!(map["n"].as_u64(), Some(7));
        assert!(Value::from(f64::NAN).is_null());
    }
}
