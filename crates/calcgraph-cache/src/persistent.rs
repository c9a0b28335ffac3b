//! On-disk implementation of [`CacheBackend`].
//!
//! [`PersistentCache`] keeps one directory per composer name under a cache
//! root. Each node owns three files:
//!
//! ```text
//! <root>/<name>/<node>.data       blob bytes, codec-encoded
//! <root>/<name>/<node>.info.json  {"format": "opaque" | "tabular"}
//! <root>/<name>/<node>.fn.hash    raw 32-byte content signature
//! ```
//!
//! Writes go to a temp file in the same directory and are renamed into
//! place, so a reader never observes a half-written file. A node with any of
//! its three files missing is simply not cached; `valid` answers `false` and
//! tolerates unreadable state the same way.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use calcgraph_core::value::Value;

use crate::backend::CacheBackend;
use crate::codec::{default_codecs, BlobFormat, ValueCodec};
use crate::error::CacheError;
use crate::signature::ContentSignature;

/// Sidecar contents recording which codec wrote the blob.
#[derive(Debug, Serialize, Deserialize)]
struct SidecarInfo {
    format: BlobFormat,
}

/// Stores results on disk, one directory per composer name.
pub struct PersistentCache {
    name: String,
    root: PathBuf,
    codecs: Vec<Box<dyn ValueCodec>>,
}

impl PersistentCache {
    /// Default cache root, relative to the working directory.
    pub const DEFAULT_DIR: &'static str = ".calcgraph_cache";

    /// Opens (creating if needed) the cache directory for `name` under
    /// `cache_dir`, or under [`Self::DEFAULT_DIR`] when `cache_dir` is
    /// `None`.
    pub fn new(name: impl Into<String>, cache_dir: Option<&Path>) -> Result<Self, CacheError> {
        let name = name.into();
        let base = cache_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DIR));
        let root = base.join(&name);
        fs::create_dir_all(&root).map_err(|e| CacheError::io("create", &root, e))?;
        Ok(PersistentCache {
            name,
            root,
            codecs: default_codecs(),
        })
    }

    /// Replaces the codec set. Order is write preference.
    pub fn with_codecs(mut self, codecs: Vec<Box<dyn ValueCodec>>) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self, node: &str) -> PathBuf {
        self.root.join(format!("{node}.data"))
    }

    fn info_path(&self, node: &str) -> PathBuf {
        self.root.join(format!("{node}.info.json"))
    }

    fn hash_path(&self, node: &str) -> PathBuf {
        self.root.join(format!("{node}.fn.hash"))
    }

    /// Writes bytes to a temp file in the target directory, then renames
    /// into place. The temp file is removed on failure.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes).map_err(|e| CacheError::io("write", &tmp, e))?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::io("rename", path, e));
        }
        Ok(())
    }

    fn remove_if_present(&self, path: &Path) -> Result<(), CacheError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io("remove", path, e)),
        }
    }
}

impl CacheBackend for PersistentCache {
    fn valid(&self, node: &str, current: &ContentSignature) -> bool {
        if !self.data_path(node).exists() || !self.info_path(node).exists() {
            debug!(cache = %self.name, node, "no cached files");
            return false;
        }
        let stored = match fs::read(self.hash_path(node)) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(cache = %self.name, node, error = %e, "signature unreadable");
                return false;
            }
        };
        match ContentSignature::try_from_slice(&stored) {
            Some(stamp) if stamp == *current => true,
            Some(_) => {
                debug!(cache = %self.name, node, "content change detected");
                false
            }
            None => {
                warn!(cache = %self.name, node, "malformed signature file");
                false
            }
        }
    }

    fn get(&self, node: &str) -> Result<Value, CacheError> {
        let info_bytes = match fs::read(self.info_path(node)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CacheError::Missing {
                    node: node.to_string(),
                })
            }
            Err(e) => return Err(CacheError::io("read", self.info_path(node), e)),
        };
        let info: SidecarInfo = serde_json::from_slice(&info_bytes)?;

        let codec = self
            .codecs
            .iter()
            .find(|c| c.format() == info.format)
            .ok_or_else(|| CacheError::UnknownFormat {
                node: node.to_string(),
                format: info.format.as_str().to_string(),
            })?;

        let data = match fs::read(self.data_path(node)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CacheError::Missing {
                    node: node.to_string(),
                })
            }
            Err(e) => return Err(CacheError::io("read", self.data_path(node), e)),
        };
        debug!(cache = %self.name, node, format = info.format.as_str(), "disk cache retrieval");
        codec.decode(&data)
    }

    fn set(
        &mut self,
        node: &str,
        signature: &ContentSignature,
        value: &Value,
    ) -> Result<(), CacheError> {
        let codec = self
            .codecs
            .iter()
            .find(|c| c.can_encode(value))
            .ok_or_else(|| CacheError::UnknownFormat {
                node: node.to_string(),
                format: "<none accepted>".to_string(),
            })?;
        debug!(cache = %self.name, node, format = codec.format().as_str(), "disk cache store");

        let data = codec.encode(value)?;
        let info = serde_json::to_vec(&SidecarInfo {
            format: codec.format(),
        })?;

        // Hash last: a crash between writes leaves a stale or absent stamp,
        // which reads as "not cached".
        self.write_atomic(&self.data_path(node), &data)?;
        self.write_atomic(&self.info_path(node), &info)?;
        self.write_atomic(&self.hash_path(node), signature.as_bytes())?;
        Ok(())
    }

    fn invalidate(&mut self, node: &str) -> Result<(), CacheError> {
        debug!(cache = %self.name, node, "disk cache invalidate");
        self.remove_if_present(&self.hash_path(node))?;
        self.remove_if_present(&self.data_path(node))?;
        self.remove_if_present(&self.info_path(node))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> PersistentCache {
        PersistentCache::new("unit", Some(dir.path())).unwrap()
    }

    #[test]
    fn set_then_valid_then_get() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);
        let sig = ContentSignature::of_text("tag");
        cache.set("a", &sig, &Value::Int(7)).unwrap();

        assert!(cache.valid("a", &sig));
        assert_eq!(cache.get("a").unwrap(), Value::Int(7));
    }

    #[test]
    fn files_follow_the_layout() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);
        let sig = ContentSignature::of_text("tag");
        cache.set("node", &sig, &Value::Int(1)).unwrap();

        let base = dir.path().join("unit");
        assert!(base.join("node.data").exists());
        assert!(base.join("node.info.json").exists());
        let hash = fs::read(base.join("node.fn.hash")).unwrap();
        assert_eq!(hash.len(), 32);
        assert_eq!(&hash[..], sig.as_bytes());

        let info: serde_json::Value =
            serde_json::from_slice(&fs::read(base.join("node.info.json")).unwrap()).unwrap();
        assert_eq!(info["format"], "opaque");
    }

    #[test]
    fn tabular_values_record_their_format() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);
        let sig = ContentSignature::of_text("tag");
        let mut row = std::collections::BTreeMap::new();
        row.insert("x".to_string(), Value::Int(1));
        let rows = Value::List(vec![Value::Map(row)]);
        cache.set("frame", &sig, &rows).unwrap();

        let info: serde_json::Value = serde_json::from_slice(
            &fs::read(dir.path().join("unit").join("frame.info.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(info["format"], "tabular");
        assert_eq!(cache.get("frame").unwrap(), rows);
    }

    #[test]
    fn changed_signature_is_invalid() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);
        cache
            .set("a", &ContentSignature::of_text("v1"), &Value::Int(1))
            .unwrap();
        assert!(!cache.valid("a", &ContentSignature::of_text("v2")));
    }

    #[test]
    fn missing_file_means_not_cached() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);
        let sig = ContentSignature::of_text("tag");
        cache.set("a", &sig, &Value::Int(1)).unwrap();

        fs::remove_file(dir.path().join("unit").join("a.fn.hash")).unwrap();
        assert!(!cache.valid("a", &sig));
    }

    #[test]
    fn invalidate_removes_all_three_files_idempotently() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);
        let sig = ContentSignature::of_text("tag");
        cache.set("a", &sig, &Value::Int(1)).unwrap();

        cache.invalidate("a").unwrap();
        cache.invalidate("a").unwrap();

        let base = dir.path().join("unit");
        assert!(!base.join("a.data").exists());
        assert!(!base.join("a.info.json").exists());
        assert!(!base.join("a.fn.hash").exists());
        assert!(!cache.valid("a", &sig));
    }

    #[test]
    fn values_survive_reopening() {
        let dir = TempDir::new().unwrap();
        let sig = ContentSignature::of_text("tag");
        {
            let mut cache = open(&dir);
            cache.set("a", &sig, &Value::from("persisted")).unwrap();
        }
        let cache = open(&dir);
        assert!(cache.valid("a", &sig));
        assert_eq!(cache.get("a").unwrap(), Value::from("persisted"));
    }

    #[test]
    fn separate_names_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let sig = ContentSignature::of_text("tag");
        let mut first = PersistentCache::new("first", Some(dir.path())).unwrap();
        let second = PersistentCache::new("second", Some(dir.path())).unwrap();
        first.set("a", &sig, &Value::Int(1)).unwrap();

        assert!(first.valid("a", &sig));
        assert!(!second.valid("a", &sig));
    }
}
