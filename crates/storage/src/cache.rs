use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[async_trait]
pub trait ContentCache: Send + Sync {
    fn name(&self) -> &'static str;
    async fn contains(&self, url: &str) -> Result<bool>;
    /// Keeps `payload` as the response for `url`. `false` if already cached.
    async fn store(&self, url: &str, payload: &[u8]) -> Result<bool>;
    async fn lookup(&self, url: &str) -> Result<Option<PathBuf>>;
}

#[derive(Debug, Clone)]
pub struct DiskAudioCache {
    dir: PathBuf,
}

impl DiskAudioCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, url: &str) -> PathBuf {
        entry_path(&self.dir, url)
    }
}

/// `<dir>/<sha256(url)>.audio`, present or not.
pub fn entry_path(dir: &Path, url: &str) -> PathBuf {
    let digest = Sha256::digest(url.as_bytes());
    dir.join(format!("{digest:x}.audio"))
}

#[async_trait]
impl ContentCache for DiskAudioCache {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn contains(&self, url: &str) -> Result<bool> {
        let path = self.entry_path(url);
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("failed to stat {}", path.display()))
    }

    async fn store(&self, url: &str, payload: &[u8]) -> Result<bool> {
        if self.contains(url).await? {
            return Ok(false);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.entry_path(url);
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, payload)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to move {} into place", tmp.display()))?;

        info!(bytes = payload.len(), path = %path.display(), "cached audio for offline playback");
        Ok(true)
    }

    async fn lookup(&self, url: &str) -> Result<Option<PathBuf>> {
        let path = self.entry_path(url);
        if self.contains(url).await? {
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}

pub struct NullCache;

#[async_trait]
impl ContentCache for NullCache {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn contains(&self, _url: &str) -> Result<bool> {
        Ok(false)
    }

    async fn store(&self, _url: &str, _payload: &[u8]) -> Result<bool> {
        debug!("offline cache disabled; skipping");
        Ok(false)
    }

    async fn lookup(&self, _url: &str) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

pub fn build_cache(enabled: bool, dir: Option<PathBuf>) -> Box<dyn ContentCache> {
    match (enabled, dir) {
        (true, Some(dir)) => Box::new(DiskAudioCache::new(dir)),
        _ => Box::new(NullCache),
    }
}

#[cfg(test)]
mod tests {
    use super::{build_cache, entry_path, ContentCache, DiskAudioCache, NullCache};
    use std::path::Path;

    #[test]
    fn entry_paths_are_stable_and_distinct() {
        let dir = Path::new("/cache");
        let a = entry_path(dir, "https://cdn.test/a.mp4");
        assert_eq!(a, entry_path(dir, "https://cdn.test/a.mp4"));
        assert_ne!(a, entry_path(dir, "https://cdn.test/b.mp4"));
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("audio"));
    }

    #[tokio::test]
    async fn stores_payload_once() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskAudioCache::new(tmp.path().join("audio"));
        let url = "https://cdn.test/song.mp4";

        assert!(!cache.contains(url).await.unwrap());
        assert!(cache.lookup(url).await.unwrap().is_none());

        assert!(cache.store(url, b"payload").await.unwrap());
        assert!(!cache.store(url, b"other").await.unwrap());
        assert_eq!(std::fs::read(cache.entry_path(url)).unwrap(), b"payload");
        assert_eq!(cache.lookup(url).await.unwrap(), Some(cache.entry_path(url)));
        assert!(!cache.entry_path(url).with_extension("part").exists());
    }

    #[tokio::test]
    async fn disabled_cache_is_inert() {
        let cache = build_cache(false, Some("/tmp/x".into()));
        assert_eq!(cache.name(), "null");
        assert!(!NullCache.store("https://cdn.test/a", b"x").await.unwrap());
        assert!(!cache.contains("https://cdn.test/a").await.unwrap());
    }
}
