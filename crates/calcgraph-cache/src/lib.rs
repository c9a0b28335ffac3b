//! Cache backends and content signatures for the calcgraph composer.
//!
//! A cache entry's validity is keyed to the content of the node that
//! produced it: the composer computes a [`ContentSignature`] per node and a
//! [`CacheBackend`] answers whether its stored stamp still matches. Stale
//! entries are recomputed; descendant invalidation is driven from above by
//! the planner, never by a backend.

pub mod backend;
pub mod codec;
pub mod error;
pub mod memory;
pub mod persistent;
pub mod signature;

// Re-export commonly used types
pub use backend::{CacheBackend, NullCache};
pub use codec::{default_codecs, BlobFormat, OpaqueCodec, TabularCodec, ValueCodec};
pub use error::CacheError;
pub use memory::MemoryCache;
pub use persistent::PersistentCache;
pub use signature::{node_signature, ContentSignature};
