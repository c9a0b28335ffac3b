//! In-memory implementation of [`CacheBackend`].
//!
//! [`MemoryCache`] is a first-class backend for interactive sessions and
//! tests. It keeps one map of values and one of signature stamps; stamps are
//! recorded for every node kind, so edits to functions (changed content
//! tags) are detected exactly like edits to parameter values. No state
//! survives the process.

use std::collections::HashMap;

use tracing::debug;

use calcgraph_core::value::Value;

use crate::backend::CacheBackend;
use crate::error::CacheError;
use crate::signature::ContentSignature;

/// Stores results in process memory.
#[derive(Debug, Default)]
pub struct MemoryCache {
    values: HashMap<String, Value>,
    stamps: HashMap<String, ContentSignature>,
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache::default()
    }

    /// Number of cached entries, for diagnostics and tests.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl CacheBackend for MemoryCache {
    fn valid(&self, node: &str, current: &ContentSignature) -> bool {
        let valid = self.values.contains_key(node) && self.stamps.get(node) == Some(current);
        debug!(node, valid, "memory cache validity");
        valid
    }

    fn get(&self, node: &str) -> Result<Value, CacheError> {
        self.values
            .get(node)
            .cloned()
            .ok_or_else(|| CacheError::Missing {
                node: node.to_string(),
            })
    }

    fn set(
        &mut self,
        node: &str,
        signature: &ContentSignature,
        value: &Value,
    ) -> Result<(), CacheError> {
        debug!(node, "memory cache store");
        self.values.insert(node.to_string(), value.clone());
        self.stamps.insert(node.to_string(), *signature);
        Ok(())
    }

    fn invalidate(&mut self, node: &str) -> Result<(), CacheError> {
        debug!(node, "memory cache invalidate");
        self.values.remove(node);
        self.stamps.remove(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_valid_then_get() {
        let mut cache = MemoryCache::new();
        let sig = ContentSignature::of_text("tag1");
        cache.set("a", &sig, &Value::Int(10)).unwrap();

        assert!(cache.valid("a", &sig));
        assert_eq!(cache.get("a").unwrap(), Value::Int(10));
    }

    #[test]
    fn stale_stamp_is_invalid() {
        let mut cache = MemoryCache::new();
        let old = ContentSignature::of_text("tag1");
        let new = ContentSignature::of_text("tag2");
        cache.set("a", &old, &Value::Int(10)).unwrap();

        assert!(!cache.valid("a", &new));
        // The stale value is still retrievable until invalidated; validity is
        // the gate.
        assert_eq!(cache.get("a").unwrap(), Value::Int(10));
    }

    #[test]
    fn invalidate_is_idempotent() {
        let mut cache = MemoryCache::new();
        let sig = ContentSignature::of_text("t");
        cache.set("a", &sig, &Value::Int(1)).unwrap();
        cache.invalidate("a").unwrap();
        cache.invalidate("a").unwrap();

        assert!(!cache.valid("a", &sig));
        assert!(matches!(cache.get("a"), Err(CacheError::Missing { .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn overwrite_updates_stamp() {
        let mut cache = MemoryCache::new();
        let old = ContentSignature::of_text("v1");
        let new = ContentSignature::of_text("v2");
        cache.set("a", &old, &Value::Int(1)).unwrap();
        cache.set("a", &new, &Value::Int(2)).unwrap();

        assert!(!cache.valid("a", &old));
        assert!(cache.valid("a", &new));
        assert_eq!(cache.get("a").unwrap(), Value::Int(2));
    }
}
