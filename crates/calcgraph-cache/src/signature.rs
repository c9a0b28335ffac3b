//! Deterministic content signatures for graph nodes.
//!
//! A [`ContentSignature`] is the 256-bit digest a cache entry is stamped
//! with; an entry is valid only while the node's current signature matches
//! the stamp. Derivation per node kind:
//!
//! - source-map override present: digest of the override text,
//! - parameter leaf: digest of the canonical JSON encoding of the value,
//! - link: digest of the comma-joined formal parameter names,
//! - function: digest of the explicit content tag.
//!
//! Determinism notes: parameter values serialize through `serde_json` with
//! `BTreeMap` keys, so the encoding is canonical; nothing here iterates a
//! `HashMap`.

use std::fmt;

use sha2::{Digest, Sha256};

use calcgraph_core::node::Node;
use calcgraph_core::value::Value;

use crate::error::CacheError;

/// A 32-byte SHA-256 content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentSignature([u8; 32]);

impl ContentSignature {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ContentSignature(bytes)
    }

    /// Parses a signature from a raw byte slice, `None` on length mismatch.
    pub fn try_from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(ContentSignature)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Digest of a text source.
    pub fn of_text(text: &str) -> Self {
        ContentSignature(Sha256::digest(text.as_bytes()).into())
    }

    /// Digest of a value's canonical JSON encoding.
    pub fn of_value(value: &Value) -> Result<Self, CacheError> {
        let encoded = serde_json::to_vec(value)?;
        Ok(ContentSignature(Sha256::digest(&encoded).into()))
    }

    /// Lowercase hex rendering, for display and content tags.
    pub fn to_hex(&self) -> String {
        use fmt::Write;
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl fmt::Debug for ContentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentSignature({})", self.to_hex())
    }
}

impl fmt::Display for ContentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Computes the current signature of a node.
///
/// `source_override` is the node's entry in the composer's source map, which
/// replaces every other derivation when present.
pub fn node_signature(
    node: &Node,
    source_override: Option<&str>,
) -> Result<ContentSignature, CacheError> {
    if let Some(text) = source_override {
        return Ok(ContentSignature::of_text(text));
    }
    match node {
        Node::Parameter(leaf) => ContentSignature::of_value(&leaf.value),
        Node::Link(link) => {
            let joined: Vec<&str> = link.params().iter().map(|p| p.name.as_str()).collect();
            Ok(ContentSignature::of_text(&joined.join(",")))
        }
        Node::Function(func) => Ok(ContentSignature::of_text(&func.content_tag)),
    }
}
