//! The [`CacheBackend`] trait defining the storage contract for node results.
//!
//! A backend is a per-node store with a validity predicate; it never walks
//! the graph. Descendant invalidation is the planner's responsibility, not
//! the backend's. The trait is synchronous: the executor is single-threaded
//! by design and backends are only ever driven from one calculation at a
//! time.
//!
//! All backends (NullCache, MemoryCache, PersistentCache) implement this
//! trait, so they are fully swappable without touching the engine.

use calcgraph_core::value::Value;

use crate::error::CacheError;
use crate::signature::ContentSignature;

/// The storage contract for node results.
pub trait CacheBackend {
    /// Returns `true` iff a stored entry exists for `node` and its stamp
    /// matches the node's `current` content signature.
    fn valid(&self, node: &str, current: &ContentSignature) -> bool;

    /// Returns the stored value. Callers only invoke this after `valid`
    /// returned `true`, but backends must fail with [`CacheError::Missing`]
    /// rather than panic if the entry has meanwhile vanished.
    fn get(&self, node: &str) -> Result<Value, CacheError>;

    /// Persists the value, stamping it with the given signature.
    fn set(
        &mut self,
        node: &str,
        signature: &ContentSignature,
        value: &Value,
    ) -> Result<(), CacheError>;

    /// Deletes the stored entry and stamp, if present. Idempotent.
    fn invalidate(&mut self, node: &str) -> Result<(), CacheError>;
}

/// Performs no caching: nothing is ever valid and writes are discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl CacheBackend for NullCache {
    fn valid(&self, _node: &str, _current: &ContentSignature) -> bool {
        false
    }

    fn get(&self, node: &str) -> Result<Value, CacheError> {
        Err(CacheError::Missing {
            node: node.to_string(),
        })
    }

    fn set(
        &mut self,
        _node: &str,
        _signature: &ContentSignature,
        _value: &Value,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    fn invalidate(&mut self, _node: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_cache_never_validates() {
        let mut cache = NullCache;
        let sig = ContentSignature::of_text("x");
        cache.set("a", &sig, &Value::Int(1)).unwrap();
        assert!(!cache.valid("a", &sig));
        assert!(matches!(
            cache.get("a"),
            Err(CacheError::Missing { .. })
        ));
        cache.invalidate("a").unwrap();
    }
}
