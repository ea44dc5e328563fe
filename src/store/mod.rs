pub mod catalog;
pub mod keyword;
pub mod schema;
mod txn;
pub mod vector;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

pub use catalog::BlockCatalog;
pub use keyword::KeywordStore;
pub use vector::{distance_to_score, VectorStore, VectorStoreOptions};

use crate::error::Result;
use crate::model::{Block, FileRecord, VectorEntry};

/// The dual index as a single unit: `BlockCatalog` + `KeywordStore` share
/// one SQLite connection (`cache.db`); `VectorStore` is the separate
/// `vectors.hnsw` ANN file. [`Store`] is what the Ingestor and
/// HybridRetriever actually hold — it is the thing that makes the
/// per-file write (`spec.md §4.5` step 5–6) atomic across all three.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    pub catalog: BlockCatalog,
    pub keyword: KeywordStore,
    pub vectors: VectorStore,
    next_label: AtomicU64,
}

impl Store {
    pub fn open(cache_db_path: &Path, vectors_path: &Path, vector_opts: VectorStoreOptions) -> Result<Self> {
        let conn = Arc::new(Mutex::new(schema::open_connection(cache_db_path)?));
        let catalog = BlockCatalog::new(conn.clone());
        let keyword = KeywordStore::new(conn.clone());
        let vectors = VectorStore::open(vectors_path, vector_opts)?;
        let next_label = AtomicU64::new(catalog.max_vector_label()?.map(|m| m + 1).unwrap_or(0));
        Ok(Self { conn, catalog, keyword, vectors, next_label })
    }

    /// Per-file atomic replace: deletes this file's existing blocks from
    /// `code_blocks`/`code_fts`/`vector_map` and inserts the new ones, all
    /// in one SQL transaction. Vectors are added to the ANN index *after*
    /// commit, per `spec.md §4.5` step 6 — durability of the vectors
    /// themselves is covered by [`Store::persist`], not this transaction.
    ///
    /// `embeddings[i]` must correspond to `blocks[i]`.
    pub fn replace_file_blocks(
        &self,
        file_path: &str,
        blocks: &[Block],
        embeddings: &[Vec<f32>],
        file_record: &FileRecord,
    ) -> Result<()> {
        debug_assert_eq!(blocks.len(), embeddings.len());

        let new_entries: Vec<VectorEntry> = embeddings
            .iter()
            .map(|vector| VectorEntry {
                label: self.next_label.fetch_add(1, Ordering::SeqCst),
                vector: vector.clone(),
            })
            .collect();
        let new_labels: Vec<u64> = new_entries.iter().map(|e| e.label).collect();

        let stale_labels = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;

            let stale = txn::delete_blocks_for_file(&tx, file_path)?;

            for block in blocks {
                txn::insert_block(&tx, block)?;
                txn::insert_fts_row(&tx, block)?;
            }
            for (block, label) in blocks.iter().zip(new_labels.iter()) {
                txn::insert_vector_mapping(&tx, *label, &block.block_id)?;
            }
            txn::upsert_file_record(&tx, file_record)?;

            tx.commit()?;
            stale
        };

        for label in stale_labels {
            self.vectors.remove(label)?;
        }
        for entry in &new_entries {
            self.vectors.insert(entry.label, &entry.vector)?;
        }

        Ok(())
    }

    /// Deletion path: a file disappeared. Removes its blocks from all three
    /// stores transactionally and marks the file record deleted.
    pub fn delete_file(&self, file_path: &str) -> Result<()> {
        let stale_labels = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            let stale = txn::delete_blocks_for_file(&tx, file_path)?;
            txn::mark_file_deleted(&tx, file_path)?;
            tx.commit()?;
            stale
        };
        for label in stale_labels {
            self.vectors.remove(label)?;
        }
        Ok(())
    }

    /// Semantic search: ANN search then translate labels to block_ids via
    /// `vector_map`, dropping labels with no live row (tombstones),
    /// per `spec.md §4.2`.
    pub fn vector_search(&self, query_vector: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let raw = self.vectors.search(query_vector, k)?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let labels: Vec<u64> = raw.iter().map(|(l, _)| *l).collect();
        let resolved = self.catalog.block_ids_for_labels(&labels)?;
        let by_label: std::collections::HashMap<u64, String> = resolved.into_iter().collect();
        Ok(raw
            .into_iter()
            .filter_map(|(label, distance)| by_label.get(&label).map(|id| (id.clone(), distance_to_score(distance))))
            .collect())
    }

    pub fn persist(&self) -> Result<()> {
        self.vectors.persist()
    }
}
