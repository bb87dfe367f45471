//! Template blob cache
//!
//! Database templates are large binary dumps that never change once
//! published, so they are fetched once and kept on disk. Each entry is a
//! CBOR record under `<data_dir>/templates/`.

use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{StorageError, StorageResult};
use super::persistence::atomic_write;
use crate::config::Config;

/// Key/value store for binary blobs
pub trait BlobCache: Send + Sync {
    /// Look up a blob; a miss is `Ok(None)`
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Store a blob, replacing any previous entry
    fn put(&self, key: &str, blob: &[u8]) -> StorageResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    key: String,
    stored_at: DateTime<Utc>,
    #[serde(with = "serde_bytes")]
    blob: Vec<u8>,
}

/// Cache with one file per key
#[derive(Debug, Clone)]
pub struct FileBlobCache {
    dir: PathBuf,
}

impl FileBlobCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.template_cache_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.cbor", name))
    }
}

impl BlobCache for FileBlobCache {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path).map_err(|e| StorageError::from_read_io(e, path.clone()))?;
        let record: CacheRecord = match ciborium::from_reader(bytes.as_slice()) {
            Ok(record) => record,
            Err(e) => {
                // A broken entry is just a miss; the next put overwrites it
                warn!("Ignoring unreadable cache entry {:?}: {}", path, e);
                return Ok(None);
            }
        };

        // Two keys can sanitize to the same file name
        if record.key != key {
            return Ok(None);
        }

        debug!("Cache hit for {} (stored {})", key, record.stored_at);
        Ok(Some(record.blob))
    }

    fn put(&self, key: &str, blob: &[u8]) -> StorageResult<()> {
        let path = self.entry_path(key);
        let record = CacheRecord {
            key: key.to_string(),
            stored_at: Utc::now(),
            blob: blob.to_vec(),
        };

        let mut bytes = Vec::new();
        ciborium::into_writer(&record, &mut bytes).map_err(|e| StorageError::Encode {
            path: path.clone(),
            details: e.to_string(),
        })?;

        atomic_write(&path, &bytes)
    }
}

/// In-memory cache, mostly for tests
#[derive(Debug, Default)]
pub struct MemoryBlobCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobCache for MemoryBlobCache {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, blob: &[u8]) -> StorageResult<()> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}

/// Return the cached blob for `key`, fetching and caching it on a miss
///
/// A cache that fails to read or write only costs a refetch; the error is
/// logged and the fetched blob is still returned.
pub async fn fetch_template<C, F, Fut>(cache: &C, key: &str, fetch: F) -> Result<Vec<u8>>
where
    C: BlobCache + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<u8>>>,
{
    match cache.get(key) {
        Ok(Some(blob)) => return Ok(blob),
        Ok(None) => {}
        Err(e) => warn!("Template cache lookup failed for {}: {}", key, e),
    }

    let blob = fetch().await?;
    if let Err(e) = cache.put(key, &blob) {
        warn!("Failed to cache template {}: {}", key, e);
    }
    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_file_cache_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileBlobCache::new(temp_dir.path().join("templates"));

        assert_eq!(cache.get("42").unwrap(), None);

        cache.put("42", &[0x1f, 0x8b, 0x00, 0xff]).unwrap();
        assert_eq!(cache.get("42").unwrap(), Some(vec![0x1f, 0x8b, 0x00, 0xff]));
        assert!(temp_dir.path().join("templates").join("42.cbor").exists());

        // Replacing an entry
        cache.put("42", b"new").unwrap();
        assert_eq!(cache.get("42").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn test_file_cache_key_collision_is_a_miss() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileBlobCache::new(temp_dir.path());

        cache.put("a/b", b"first").unwrap();
        assert_eq!(cache.get("a_b").unwrap(), None);
        assert_eq!(cache.get("a/b").unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn test_file_cache_unreadable_entry_is_a_miss() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileBlobCache::new(temp_dir.path());
        fs::write(temp_dir.path().join("7.cbor"), b"garbage").unwrap();

        assert_eq!(cache.get("7").unwrap(), None);
        cache.put("7", b"fixed").unwrap();
        assert_eq!(cache.get("7").unwrap(), Some(b"fixed".to_vec()));
    }

    #[test]
    fn test_file_cache_from_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        let cache = FileBlobCache::from_config(&config);
        assert_eq!(cache.dir(), temp_dir.path().join("templates"));
    }

    #[tokio::test]
    async fn test_fetch_template_uses_cache() {
        let cache = MemoryBlobCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let blob = fetch_template(&cache, "5", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(b"dump".to_vec())
            })
            .await
            .unwrap();
            assert_eq!(blob, b"dump");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_cached() {
        let cache = MemoryBlobCache::new();

        let result = fetch_template(&cache, "5", || async {
            Err(anyhow::anyhow!("template unavailable"))
        })
        .await;

        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
