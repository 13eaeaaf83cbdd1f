//! # Key/Value Stores
//!
//! Capacity-limited string stores behind the synchronizer.
//!
//! - [`MemoryStore`]: in-process map with a byte quota. Clones share the same
//!   map, the way every tab of a browser shares one local storage.
//! - [`FileStore`]: one `<key>.json` file per key in a directory, written
//!   through a temp file and a rename.
//!
//! Sizes are `key.len() + value.len()` bytes. A `set` that would take the
//! store past its quota fails with `StoreError::QuotaExceeded` and leaves the
//! previous value in place.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};

/// A string key/value store with a byte quota.
pub trait KeyValueStore {
    /// Reads a value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the backing medium fails.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::QuotaExceeded` when the write does not fit, or
    /// `StoreError::Io` if the backing medium fails.
    fn set(&mut self, key: &str, value: &str) -> StoreResult<()>;

    /// Deletes a value. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the backing medium fails.
    fn remove(&mut self, key: &str) -> StoreResult<()>;

    /// Bytes currently used.
    fn total_bytes(&self) -> usize;

    /// Stored keys in ascending order.
    fn keys(&self) -> Vec<String>;
}

fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

fn check_quota(key: &str, used: usize, replaced: usize, incoming: usize, quota: usize) -> StoreResult<()> {
    let available = quota.saturating_sub(used.saturating_sub(replaced));
    if incoming > available {
        return Err(StoreError::QuotaExceeded {
            key: key.to_string(),
            attempted: incoming,
            available,
        });
    }
    Ok(())
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Debug)]
struct MemoryInner {
    entries: BTreeMap<String, String>,
    used: usize,
    quota: usize,
}

/// Shared in-memory store.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    /// Creates an empty store holding at most `quota_bytes`.
    #[must_use]
    pub fn new(quota_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner {
                entries: BTreeMap::new(),
                used: 0,
                quota: quota_bytes,
            })),
        }
    }

    /// Configured quota.
    #[must_use]
    pub fn quota(&self) -> usize {
        self.inner.lock().quota
    }

    /// Changes the quota. Existing entries are kept even if they no longer fit.
    pub fn set_quota(&self, quota_bytes: usize) {
        self.inner.lock().quota = quota_bytes;
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.lock().entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let replaced = inner.entries.get(key).map_or(0, |old| entry_size(key, old));
        let incoming = entry_size(key, value);
        check_quota(key, inner.used, replaced, incoming, inner.quota)?;

        inner.used = inner.used - replaced + incoming;
        inner.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if let Some(old) = inner.entries.remove(key) {
            inner.used -= entry_size(key, &old);
        }
        Ok(())
    }

    fn total_bytes(&self) -> usize {
        self.inner.lock().used
    }

    fn keys(&self) -> Vec<String> {
        self.inner.lock().entries.keys().cloned().collect()
    }
}

// ============================================================================
// Files
// ============================================================================

const FILE_EXTENSION: &str = "json";

/// Directory-backed store.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    quota: usize,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>, quota_bytes: usize) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), quota_bytes, "file store opened");
        Ok(Self {
            dir,
            quota: quota_bytes,
        })
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        self.dir.join(format!("{file_name}.{FILE_EXTENSION}"))
    }

    fn entries(&self) -> Vec<(String, usize)> {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut entries: Vec<(String, usize)> = read_dir
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension()? != FILE_EXTENSION {
                    return None;
                }
                let key = path.file_stem()?.to_str()?.to_string();
                let len = usize::try_from(entry.metadata().ok()?.len()).ok()?;
                Some((key, len))
            })
            .collect();
        entries.sort();
        entries
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        let path = self.path_for(key);
        let replaced = fs::metadata(&path)
            .ok()
            .and_then(|m| usize::try_from(m.len()).ok())
            .map_or(0, |len| key.len() + len);
        check_quota(key, self.total_bytes(), replaced, entry_size(key, value), self.quota)?;

        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn total_bytes(&self) -> usize {
        self.entries().iter().map(|(key, len)| key.len() + len).sum()
    }

    fn keys(&self) -> Vec<String> {
        self.entries().into_iter().map(|(key, _)| key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("ascend_store_{id}"))
    }

    #[test]
    fn test_memory_store_accounts_bytes() {
        let mut store = MemoryStore::new(1024);
        store.set("users", "[1,2,3]").unwrap();
        assert_eq!(store.total_bytes(), 5 + 7);

        store.set("users", "[]").unwrap();
        assert_eq!(store.total_bytes(), 5 + 2);

        store.remove("users").unwrap();
        store.remove("users").unwrap();
        assert_eq!(store.total_bytes(), 0);
        assert_eq!(store.get("users").unwrap(), None);
    }

    #[test]
    fn test_memory_store_quota() {
        let mut store = MemoryStore::new(20);
        store.set("a", "0123456789").unwrap();

        let err = store.set("b", "0123456789").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { attempted: 11, available: 9, .. }));
        assert_eq!(store.get("b").unwrap(), None);

        // Replacing an entry only needs room for the difference.
        store.set("a", "0123456789012345678").unwrap();
        assert_eq!(store.total_bytes(), 20);
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let mut store = MemoryStore::new(1024);
        let view = store.clone();
        store.set("k", "v").unwrap();
        assert_eq!(view.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(view.keys(), vec!["k".to_string()]);
    }

    #[test]
    fn test_file_store_roundtrip_and_quota() {
        let dir = temp_dir();
        let mut store = FileStore::open(&dir, 64).unwrap();

        store.set("cases", "[{\"id\":1}]").unwrap();
        assert_eq!(store.get("cases").unwrap().as_deref(), Some("[{\"id\":1}]"));
        assert_eq!(store.keys(), vec!["cases".to_string()]);
        assert_eq!(store.total_bytes(), 5 + 10);

        let big = "x".repeat(100);
        assert!(matches!(
            store.set("userCases", &big),
            Err(StoreError::QuotaExceeded { .. })
        ));
        assert_eq!(store.get("userCases").unwrap(), None);

        store.remove("cases").unwrap();
        assert!(store.keys().is_empty());

        fs::remove_dir_all(&dir).ok();
    }
}
