use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

pub mod cache;
pub mod lists;
pub mod session;

pub use cache::{build_cache, entry_path, ContentCache, DiskAudioCache, NullCache};
pub use lists::{LikedSongs, RecentlyPlayed, RECENT_CAPACITY};
pub use session::{PersistedSession, RestoredSession, SessionStore};

pub const SESSION_KEY: &str = "globalAudioState";
pub const LIKED_KEY: &str = "likedSongs";
pub const RECENT_KEY: &str = "recentlyPlayed";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode value for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> R) -> R {
        let mut guard = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.with_entries(|m| m.get(key).cloned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.with_entries(|m| m.insert(key.to_string(), value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_entries(|m| m.remove(key));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(&path)(err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        // Readers only ever see a complete value.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(io_err(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(io_err(&path))?;
        debug!(key, bytes = value.len(), "stored value");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&path)(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FileStore, KeyValueStore, MemoryStore, StorageError};

    #[test]
    fn memory_store_clones_share_entries() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.set("k", "v").unwrap();
        assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));
        b.remove("k").unwrap();
        assert_eq!(a.get("k").unwrap(), None);
    }

    #[test]
    fn file_store_round_trips_and_creates_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path().join("nested"));

        assert_eq!(store.get("likedSongs").unwrap(), None);
        store.set("likedSongs", "[]").unwrap();
        assert_eq!(store.get("likedSongs").unwrap().as_deref(), Some("[]"));
        assert!(tmp.path().join("nested/likedSongs.json").exists());

        store.remove("likedSongs").unwrap();
        store.remove("likedSongs").unwrap();
        assert_eq!(store.get("likedSongs").unwrap(), None);
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path());
        assert!(matches!(
            store.set("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
