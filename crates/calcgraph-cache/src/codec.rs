//! Pluggable blob codecs for the persistent backend.
//!
//! The persistent cache stores each node's value as an opaque byte blob and
//! records which codec produced it in a sidecar. Writers pick the first
//! registered codec that accepts the value; readers dispatch on the recorded
//! format tag. The opaque whole-value codec always accepts and is the
//! fallback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use calcgraph_core::value::Value;

use crate::error::CacheError;

/// The format tag recorded in a blob's sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobFormat {
    Opaque,
    Tabular,
}

impl BlobFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobFormat::Opaque => "opaque",
            BlobFormat::Tabular => "tabular",
        }
    }
}

/// Encodes and decodes values for one blob format.
pub trait ValueCodec: Send {
    fn format(&self) -> BlobFormat;

    /// Whether this codec can represent the value. Writers try codecs in
    /// registration order and use the first that accepts.
    fn can_encode(&self, value: &Value) -> bool;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CacheError>;

    fn decode(&self, bytes: &[u8]) -> Result<Value, CacheError>;
}

/// Whole-value JSON encoding. Accepts everything.
#[derive(Debug, Default)]
pub struct OpaqueCodec;

impl ValueCodec for OpaqueCodec {
    fn format(&self) -> BlobFormat {
        BlobFormat::Opaque
    }

    fn can_encode(&self, _value: &Value) -> bool {
        true
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CacheError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CacheError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Row-set encoding: a non-empty `List` of `Map` rows becomes one JSON
/// object per line.
#[derive(Debug, Default)]
pub struct TabularCodec;

impl ValueCodec for TabularCodec {
    fn format(&self) -> BlobFormat {
        BlobFormat::Tabular
    }

    fn can_encode(&self, value: &Value) -> bool {
        match value {
            Value::List(rows) => {
                !rows.is_empty() && rows.iter().all(|row| matches!(row, Value::Map(_)))
            }
            _ => false,
        }
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CacheError> {
        let Value::List(rows) = value else {
            return Err(CacheError::Corrupt {
                node: String::new(),
                reason: "tabular codec requires a list of rows".to_string(),
            });
        };
        let mut out = Vec::new();
        for row in rows {
            out.extend_from_slice(&serde_json::to_vec(row)?);
            out.push(b'\n');
        }
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CacheError> {
        let mut rows = Vec::new();
        for line in bytes.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            let row: BTreeMap<String, Value> = serde_json::from_slice(line)?;
            rows.push(Value::Map(row));
        }
        Ok(Value::List(rows))
    }
}

/// The default codec set, in write-preference order.
pub fn default_codecs() -> Vec<Box<dyn ValueCodec>> {
    vec![Box::new(TabularCodec), Box::new(OpaqueCodec)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, i64)]) -> Value {
        Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::Int(*v)))
                .collect(),
        )
    }

    #[test]
    fn opaque_roundtrips_everything() {
        let codec = OpaqueCodec;
        for value in [
            Value::Unit,
            Value::Int(3),
            Value::from("text"),
            Value::List(vec![Value::Int(1), Value::Bool(false)]),
        ] {
            assert!(codec.can_encode(&value));
            let bytes = codec.encode(&value).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn tabular_accepts_only_row_sets() {
        let codec = TabularCodec;
        assert!(codec.can_encode(&Value::List(vec![row(&[("a", 1)])])));
        assert!(!codec.can_encode(&Value::List(vec![])));
        assert!(!codec.can_encode(&Value::List(vec![Value::Int(1)])));
        assert!(!codec.can_encode(&Value::Int(1)));
    }

    #[test]
    fn tabular_roundtrips_rows() {
        let codec = TabularCodec;
        let value = Value::List(vec![row(&[("a", 1), ("b", 2)]), row(&[("a", 3), ("b", 4)])]);
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(bytes.iter().filter(|&&b| b == b'\n').count(), 2);
        assert_eq!(codec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn format_tags_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&BlobFormat::Opaque).unwrap(),
            "\"opaque\""
        );
        assert_eq!(
            serde_json::to_string(&BlobFormat::Tabular).unwrap(),
            "\"tabular\""
        );
    }

    #[test]
    fn default_codecs_prefer_tabular() {
        let codecs = default_codecs();
        let rows = Value::List(vec![row(&[("x", 1)])]);
        let chosen = codecs.iter().find(|c| c.can_encode(&rows)).unwrap();
        assert_eq!(chosen.format(), BlobFormat::Tabular);

        let scalar = Value::Int(1);
        let chosen = codecs.iter().find(|c| c.can_encode(&scalar)).unwrap();
        assert_eq!(chosen.format(), BlobFormat::Opaque);
    }
}
