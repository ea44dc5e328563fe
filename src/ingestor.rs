//! Orchestrates Scanner → HashCache → Parser → Chunker → Embedder → Store
//! with bounded concurrency and per-file atomicity (`spec.md §4.5`/`§5`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, info, warn};

use crate::cache::HashCache;
use crate::chunker::{ChunkOptions, Chunker};
use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::{Error, Result};
use crate::hashing::content_hash;
use crate::lang::{detect_language, parser_language_tag};
use crate::model::{now_ms, FileRecord};
use crate::parser::{Parser, TreeSitterParser};
use crate::scanner::Scanner;
use crate::store::Store;

/// Progress events surfaced to an optional observer — the core pipeline
/// never depends on any particular UI to consume these.
#[derive(Debug, Clone, Serialize)]
pub enum IndexEvent {
    Started { total: usize },
    Progress { indexed: usize, total: usize },
    FileError { file_path: String, message: String },
    Completed { indexed: usize, total: usize, duration_ms: u64 },
}

/// The pieces a spawned per-file task needs, bundled so cloning it into a
/// `tokio::spawn`'d future is a handful of `Arc` bumps rather than a borrow.
#[derive(Clone)]
struct SharedCtx {
    root: Arc<PathBuf>,
    store: Arc<Store>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<HashCache>,
    config: Arc<Config>,
}

pub struct Ingestor {
    ctx: SharedCtx,
    events: Option<broadcast::Sender<IndexEvent>>,
}

impl Ingestor {
    pub fn new(
        root: impl Into<PathBuf>,
        store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
        config: Config,
        cache_path: &Path,
    ) -> Self {
        Self {
            ctx: SharedCtx {
                root: Arc::new(root.into()),
                store,
                embedder,
                cache: Arc::new(HashCache::load(cache_path)),
                config: Arc::new(config),
            },
            events: None,
        }
    }

    pub fn with_events(mut self, sender: broadcast::Sender<IndexEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    fn emit(&self, event: IndexEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Top-level protocol (`spec.md §4.5` step 1 onward): scan, filter by
    /// HashCache, process candidate files with bounded concurrency (one
    /// `tokio::spawn`'d task per file, gated by a semaphore sized to
    /// `indexing.concurrency`), persist the vector index and the hash cache
    /// at the end.
    ///
    /// `force=true` re-ingests every scanned file regardless of HashCache
    /// state — used for a clean rebuild.
    pub async fn index_workspace(&self, force: bool) -> Result<()> {
        let start = std::time::Instant::now();

        let extra_excludes = self.ctx.config.indexing.exclude_patterns.clone();
        let scanner = Scanner::new(self.ctx.root.as_path(), self.ctx.config.indexing.max_file_size, &extra_excludes);
        let candidates = scanner.scan()?;
        let total = candidates.len();
        self.emit(IndexEvent::Started { total });

        let semaphore = Arc::new(Semaphore::new(self.ctx.config.indexing.concurrency.max(1)));
        let mut tasks = Vec::with_capacity(candidates.len());

        for relative_path in candidates {
            let absolute = self.ctx.root.join(&relative_path);
            let relative_key = relative_path.to_string_lossy().replace('\\', "/");

            // Skip-by-mtime is a synchronous, cheap check done before we
            // ever spawn a task for this file.
            let Ok(metadata) = std::fs::metadata(&absolute) else { continue };
            let mtime_ms = mtime_millis(&metadata);
            if !force && !self.ctx.cache.maybe_changed(&relative_key, mtime_ms, metadata.len()) {
                continue;
            }

            let ctx = self.ctx.clone();
            let semaphore = semaphore.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = ingest_file(&ctx, &relative_key, &absolute, mtime_ms, force).await;
                (relative_key, result)
            }));
        }

        let mut indexed = 0usize;
        for task in tasks {
            let (relative_key, result) = task.await.map_err(|e| Error::Internal(e.into()))?;
            if let Err(e) = result {
                warn!(file = %relative_key, error = %e, "failed to ingest file, skipping");
                self.emit(IndexEvent::FileError { file_path: relative_key, message: e.to_string() });
            }
            indexed += 1;
            if indexed % self.ctx.config.indexing.batch_size.max(1) == 0 {
                self.emit(IndexEvent::Progress { indexed, total });
            }
        }

        self.ctx.store.persist()?;
        self.ctx.cache.persist()?;

        let duration_ms = start.elapsed().as_millis() as u64;
        self.emit(IndexEvent::Completed { indexed, total, duration_ms });
        info!(indexed, total, duration_ms, "index_workspace complete");
        Ok(())
    }

    /// Deletion path: a file disappeared. Runs `delete_file` across the
    /// three stores transactionally and drops the cache entry.
    pub fn delete_path(&self, relative_path: &str) -> Result<()> {
        self.ctx.store.delete_file(relative_path)?;
        self.ctx.cache.remove(relative_path);
        self.ctx.cache.persist()?;
        Ok(())
    }

    /// Flushes the vector index and the hash cache to disk. Called on
    /// `index_workspace` completion and again on graceful shutdown
    /// (`spec.md §5`'s cancellation rule: a SIGINT persists all stores
    /// after the in-flight per-file tasks complete).
    pub fn persist(&self) -> Result<()> {
        self.ctx.store.persist()?;
        self.ctx.cache.persist()?;
        Ok(())
    }

    /// Re-ingests a single path, used by the Watcher for create/modify
    /// events. `force=true` because the caller already knows the file
    /// changed (a debounced fs event), skipping the mtime fast-check.
    pub async fn reingest_path(&self, relative_path: &str) -> Result<()> {
        let absolute =
            crate::scanner::validate_within_workspace(&self.ctx.root, Path::new(relative_path))?;
        let metadata = match std::fs::metadata(&absolute) {
            Ok(m) => m,
            Err(_) => {
                // File vanished between the debounced event firing and us
                // getting to it — treat the same as an explicit deletion.
                return self.delete_path(relative_path);
            }
        };
        let mtime_ms = mtime_millis(&metadata);
        ingest_file(&self.ctx, relative_path, &absolute, mtime_ms, true).await?;
        self.ctx.store.persist()?;
        self.ctx.cache.persist()?;
        Ok(())
    }
}

/// Per-file protocol (`spec.md §4.5` steps 1–8). Partial progress per file
/// is forbidden: either every new block for `relative_path` lands and the
/// old ones are gone, or the previous state is untouched. A free function
/// (rather than a method) so it can be spawned without borrowing `Ingestor`
/// across an `.await`.
async fn ingest_file(ctx: &SharedCtx, relative_path: &str, absolute: &Path, mtime_ms: i64, force: bool) -> Result<()> {
    let content = std::fs::read_to_string(absolute)
        .map_err(|e| Error::TransientIo { path: relative_path.to_string(), source: e })?;
    let hash = content_hash(&content);

    if !force && ctx.cache.confirm_unchanged(relative_path, &hash) {
        ctx.cache.bump_mtime(relative_path, mtime_ms);
        return Ok(());
    }

    let ext = Path::new(relative_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let language = detect_language(&ext);
    let parser = TreeSitterParser::new();
    let parsed = parser.parse(&content, parser_language_tag(&ext));
    if parsed.is_none() {
        debug!(file = relative_path, language, "no grammar registered, using fallback block");
    }

    let chunker = Chunker::new(ChunkOptions {
        target_tokens: ctx.config.indexing.chunk_tokens as u32,
        max_tokens: ctx.config.indexing.max_tokens as u32,
        overlap_tokens: ctx.config.indexing.overlap_tokens as u32,
    });
    let blocks = chunker.chunk_file(relative_path, &content, language, parsed.as_ref());

    let texts: Vec<String> = blocks.iter().map(|b| b.content.clone()).collect();
    let embeddings = ctx.embedder.embed_batch(&texts).await;

    let file_record = FileRecord {
        file_path: relative_path.to_string(),
        file_hash: hash.clone(),
        language: language.to_string(),
        size_bytes: content.len() as u64,
        line_count: content.lines().count() as u32,
        last_indexed: now_ms(),
        block_count: blocks.len() as u32,
        is_deleted: false,
    };

    ctx.store.replace_file_blocks(relative_path, &blocks, &embeddings, &file_record)?;

    ctx.cache.record(relative_path, &hash, mtime_ms, content.len() as u64);
    Ok(())
}

fn mtime_millis(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::VectorStoreOptions;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn initialize(&self) -> Result<()> {
            Ok(())
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1; 8])
        }
        async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            texts.iter().map(|_| vec![0.1; 8]).collect()
        }
        fn dimensions(&self) -> usize {
            8
        }
        fn model_name(&self) -> &str {
            "counting"
        }
    }

    fn make_ingestor(root: &Path, store: Arc<Store>) -> (Ingestor, Arc<CountingEmbedder>) {
        let embedder = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0) });
        let ingestor = Ingestor::new(
            root.to_path_buf(),
            store,
            embedder.clone(),
            Config::default(),
            &root.join(".syntheo/semantics/file-hashes.json"),
        );
        (ingestor, embedder)
    }

    fn fresh_store(dir: &Path) -> Arc<Store> {
        Arc::new(
            Store::open(
                &dir.join("cache.db"),
                &dir.join("vectors.usearch"),
                VectorStoreOptions { dimensions: 8, initial_capacity: 16, ..Default::default() },
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn second_run_with_no_changes_performs_zero_embedder_calls() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export function greet() { return 1; }").unwrap();

        let store = fresh_store(dir.path());
        let (ingestor, embedder) = make_ingestor(dir.path(), store);

        ingestor.index_workspace(false).await.unwrap();
        assert!(embedder.calls.load(Ordering::SeqCst) >= 1);

        let calls_after_first = embedder.calls.load(Ordering::SeqCst);
        ingestor.index_workspace(false).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn deleting_a_file_removes_its_blocks() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export function greet() { return 1; }").unwrap();

        let store = fresh_store(dir.path());
        let (ingestor, _embedder) = make_ingestor(dir.path(), store.clone());
        ingestor.index_workspace(false).await.unwrap();
        assert!(!store.catalog.blocks_for_file("a.ts").unwrap().is_empty());

        ingestor.delete_path("a.ts").unwrap();
        assert!(store.catalog.blocks_for_file("a.ts").unwrap().is_empty());
    }

    #[tokio::test]
    async fn renaming_a_symbol_reingest_replaces_blocks() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export function oldName() { return 1; }").unwrap();

        let store = fresh_store(dir.path());
        let (ingestor, _embedder) = make_ingestor(dir.path(), store.clone());
        ingestor.index_workspace(false).await.unwrap();
        let first = store.catalog.blocks_for_file("a.ts").unwrap();
        assert_eq!(first[0].symbol_name.as_deref(), Some("oldName"));

        std::fs::write(dir.path().join("a.ts"), "export function newName() { return 1; }").unwrap();
        ingestor.reingest_path("a.ts").await.unwrap();
        let second = store.catalog.blocks_for_file("a.ts").unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].symbol_name.as_deref(), Some("newName"));
    }
}
