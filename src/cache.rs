//! Change-detection cache: "has this file changed?" without re-embedding it
//! when the answer is no (`spec.md §4.4`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::model::CacheEntry;

/// Per-file `{hash, mtime, size}`, persisted as a single JSON sidecar
/// (`file-hashes.json`). One cache shared by both retrieval channels, so
/// semantic and keyword indexing can never drift onto different ideas of
/// which files are stale.
pub struct HashCache {
    entries: DashMap<String, CacheEntry>,
    path: PathBuf,
    dirty: AtomicBool,
}

impl HashCache {
    pub fn load(path: &Path) -> Self {
        let entries: HashMap<String, CacheEntry> = std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self {
            entries: entries.into_iter().collect(),
            path: path.to_path_buf(),
            dirty: AtomicBool::new(false),
        }
    }

    /// Fast check: true unless an entry exists with matching `mtime_ms`.
    /// Size is recorded but mtime is authoritative.
    pub fn maybe_changed(&self, path: &str, mtime_ms: i64, _size: u64) -> bool {
        match self.entries.get(path) {
            Some(entry) => entry.mtime_ms != mtime_ms,
            None => true,
        }
    }

    /// Second-chance check: true if `content_hash` equals the cached hash.
    /// Used to skip re-embedding touched-but-unmodified files.
    pub fn confirm_unchanged(&self, path: &str, content_hash: &str) -> bool {
        self.entries.get(path).map(|e| e.content_hash == content_hash).unwrap_or(false)
    }

    pub fn record(&self, path: &str, content_hash: &str, mtime_ms: i64, size_bytes: u64) {
        self.entries.insert(
            path.to_string(),
            CacheEntry { content_hash: content_hash.to_string(), mtime_ms, size_bytes },
        );
        self.dirty.store(true, Ordering::Release);
    }

    /// Bumps only `mtime_ms`, leaving `content_hash` untouched — used when
    /// `confirm_unchanged` catches a touched-but-unmodified file.
    pub fn bump_mtime(&self, path: &str, mtime_ms: i64) {
        if let Some(mut entry) = self.entries.get_mut(path) {
            entry.mtime_ms = mtime_ms;
            self.dirty.store(true, Ordering::Release);
        }
    }

    pub fn remove(&self, path: &str) {
        if self.entries.remove(path).is_some() {
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Writes the cache to disk only if dirty, then resets the dirty flag.
    pub fn persist(&self) -> Result<()> {
        if !self.dirty.load(Ordering::Acquire) {
            return Ok(());
        }
        let snapshot: HashMap<String, CacheEntry> =
            self.entries.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp, serde_json::to_vec(&snapshot)?)?;
        std::fs::rename(&tmp, &self.path)?;
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unseen_path_is_always_changed() {
        let dir = tempdir().unwrap();
        let cache = HashCache::load(&dir.path().join("file-hashes.json"));
        assert!(cache.maybe_changed("a.ts", 1000, 10));
    }

    #[test]
    fn matching_mtime_is_unchanged() {
        let dir = tempdir().unwrap();
        let cache = HashCache::load(&dir.path().join("file-hashes.json"));
        cache.record("a.ts", "hash1", 1000, 10);
        assert!(!cache.maybe_changed("a.ts", 1000, 10));
        assert!(cache.maybe_changed("a.ts", 2000, 10));
    }

    #[test]
    fn confirm_unchanged_matches_content_hash() {
        let dir = tempdir().unwrap();
        let cache = HashCache::load(&dir.path().join("file-hashes.json"));
        cache.record("a.ts", "hash1", 1000, 10);
        assert!(cache.confirm_unchanged("a.ts", "hash1"));
        assert!(!cache.confirm_unchanged("a.ts", "hash2"));
    }

    #[test]
    fn persist_only_writes_when_dirty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file-hashes.json");
        let cache = HashCache::load(&path);
        cache.persist().unwrap();
        assert!(!path.exists(), "clean cache should not write a file");

        cache.record("a.ts", "hash1", 1000, 10);
        cache.persist().unwrap();
        assert!(path.exists());

        let reloaded = HashCache::load(&path);
        assert!(reloaded.confirm_unchanged("a.ts", "hash1"));
    }
}
