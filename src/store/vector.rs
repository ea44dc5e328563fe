//! The dense ANN index (`spec.md §4.2`): a persistent `usearch` HNSW graph.
//!
//! The `label ↔ block_id` mapping itself lives in the transactional
//! `vector_map` table (see [`crate::store::catalog`]) rather than a
//! side file here — `spec.md §6` names `vector_map` as one of `cache.db`'s
//! tables, and keeping it there lets the Ingestor fold "insert new
//! vector-map rows" into the same atomic write as the block rows
//! (`spec.md §4.5` step 5), with only the raw vector add happening outside
//! the transaction (step 6).

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use usearch::ffi::{IndexOptions, MetricKind, ScalarKind};

use crate::error::{Error, Result};

pub struct VectorStoreOptions {
    pub dimensions: usize,
    pub initial_capacity: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl Default for VectorStoreOptions {
    fn default() -> Self {
        Self {
            dimensions: 1024,
            initial_capacity: 1_000_000,
            connectivity: 16,
            expansion_add: 200,
            expansion_search: 100,
        }
    }
}

struct Inner {
    index: usearch::Index,
    index_path: PathBuf,
}

/// Persistent approximate nearest-neighbor index over fixed-dimension
/// cosine-normalized vectors, addressed by the raw `u64` label the caller
/// already allocated (via the `vector_map` table's label counter).
pub struct VectorStore {
    inner: RwLock<Inner>,
}

impl VectorStore {
    /// Loads an existing index at `path` or initializes a new one. If the
    /// loaded capacity is below `initial_capacity`, resizes upward.
    pub fn open(path: &Path, opts: VectorStoreOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = IndexOptions {
            dimensions: opts.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: opts.connectivity,
            expansion_add: opts.expansion_add,
            expansion_search: opts.expansion_search,
            multi: false,
        };
        let index = usearch::Index::new(&options)
            .map_err(|e| Error::StoreCorruption(format!("failed to create ANN index: {e}")))?;

        if path.exists() {
            index
                .load(&path.to_string_lossy())
                .map_err(|e| Error::StoreCorruption(format!("failed to load ANN index: {e}")))?;
        } else {
            index
                .reserve(opts.initial_capacity)
                .map_err(|e| Error::CapacityExhausted(e.to_string()))?;
        }

        if index.capacity() < opts.initial_capacity {
            index
                .reserve(opts.initial_capacity)
                .map_err(|e| Error::CapacityExhausted(e.to_string()))?;
        }

        Ok(Self { inner: RwLock::new(Inner { index, index_path: path.to_path_buf() }) })
    }

    /// Adds `vector` under `label`, doubling capacity first if the index is
    /// within one slot of full (`spec.md §7`'s CapacityExhausted rule: never
    /// fail a single insert for capacity reasons).
    pub fn insert(&self, label: u64, vector: &[f32]) -> Result<()> {
        let inner = self.inner.write();
        if inner.index.size() + 1 >= inner.index.capacity() {
            let new_capacity = inner.index.capacity().max(1) * 2;
            inner
                .index
                .reserve(new_capacity)
                .map_err(|e| Error::CapacityExhausted(e.to_string()))?;
        }
        inner
            .index
            .add(label, vector)
            .map_err(|e| Error::Internal(anyhow::anyhow!("vector insert failed: {e}")))?;
        Ok(())
    }

    /// Tombstones `label`. Tombstoned labels remain in the ANN until a
    /// compaction, which is out of scope.
    pub fn remove(&self, label: u64) -> Result<()> {
        let inner = self.inner.write();
        let _ = inner.index.remove(label);
        Ok(())
    }

    /// Returns up to `k` candidates as raw `(label, distance)` pairs in
    /// ascending-distance order. Translating labels to block_ids via
    /// `vector_map` — and dropping labels without a live row — is the
    /// caller's job (typically [`crate::store::Store::vector_search`]).
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<(u64, f32)>> {
        let inner = self.inner.read();
        if inner.index.size() == 0 {
            return Ok(Vec::new());
        }
        let matches = inner
            .index
            .search(query_vector, k)
            .map_err(|e| Error::Internal(anyhow::anyhow!("ANN search failed: {e}")))?;
        Ok(matches.keys.iter().copied().zip(matches.distances.iter().copied()).collect())
    }

    pub fn len(&self) -> usize {
        self.inner.read().index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn persist(&self) -> Result<()> {
        let inner = self.inner.read();
        inner
            .index
            .save(&inner.index_path.to_string_lossy())
            .map_err(|e| Error::Internal(anyhow::anyhow!("failed to save ANN index: {e}")))?;
        Ok(())
    }
}

/// Cosine similarity from a usearch cosine distance, clipped into `[0, 1]`.
pub fn distance_to_score(distance: f32) -> f32 {
    (1.0 - distance).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn opts() -> VectorStoreOptions {
        VectorStoreOptions { dimensions: 4, initial_capacity: 8, ..VectorStoreOptions::default() }
    }

    #[test]
    fn insert_then_search_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.hnsw");
        let store = VectorStore::open(&path, opts()).unwrap();
        store.insert(0, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        store.insert(1, &[0.0, 1.0, 0.0, 0.0]).unwrap();

        let results = store.search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].0, 0);
    }

    #[test]
    fn remove_tombstones_label() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.hnsw");
        let store = VectorStore::open(&path, opts()).unwrap();
        store.insert(0, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        store.remove(0).unwrap();
        let results = store.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn capacity_grows_past_initial() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.hnsw");
        let store = VectorStore::open(&path, opts()).unwrap();
        for i in 0..16u64 {
            let v = [i as f32, 0.0, 0.0, 0.0];
            store.insert(i, &v).unwrap();
        }
        assert_eq!(store.len(), 16);
    }

    #[test]
    fn index_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.hnsw");
        {
            let store = VectorStore::open(&path, opts()).unwrap();
            store.insert(0, &[1.0, 0.0, 0.0, 0.0]).unwrap();
            store.persist().unwrap();
        }
        let reopened = VectorStore::open(&path, opts()).unwrap();
        assert_eq!(reopened.len(), 1);
    }
}
