//! A local-first semantic code search engine: syntactic chunking, dual
//! semantic/keyword indexing, and hybrid retrieval over a single workspace
//! directory. See `SPEC_FULL.md` for the full component design.

pub mod cache;
pub mod chunker;
pub mod config;
pub mod embedder;
pub mod error;
pub mod hashing;
pub mod ingestor;
pub mod lang;
pub mod model;
pub mod parser;
pub mod query_expander;
pub mod retriever;
pub mod scanner;
pub mod scorer;
pub mod store;
pub mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;

pub use config::Config;
pub use error::{Error, Result};
pub use ingestor::{IndexEvent, Ingestor};
pub use model::Block;
pub use retriever::{HybridRetriever, SearchHit, SearchOptions};
pub use watcher::Watcher;

use embedder::build_embedder;
use store::{Store, VectorStoreOptions};

const CONFIG_SUBDIR: &str = ".syntheo/semantics";

/// Ties `Config`, `Store`, `Embedder`, `Ingestor`, and `HybridRetriever`
/// together for one workspace root — the facade a CLI or any other
/// front-end collaborator drives (`SPEC_FULL.md §0`).
pub struct Engine {
    root: PathBuf,
    config: Config,
    store: Arc<Store>,
    ingestor: Arc<Ingestor>,
    retriever: HybridRetriever,
}

impl Engine {
    /// Opens (or creates) the on-disk store under
    /// `<root>/.syntheo/semantics/` and wires every component together per
    /// `spec.md §6`'s on-disk layout.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let state_dir = root.join(CONFIG_SUBDIR);
        std::fs::create_dir_all(&state_dir)?;

        let config_path = state_dir.join("config.json");
        let config = Config::load_or_default(&config_path);

        let store = Arc::new(Store::open(
            &state_dir.join("cache.db"),
            &state_dir.join("vectors.usearch"),
            VectorStoreOptions {
                dimensions: config.embedder.dimensions,
                expansion_search: config.performance.hnsw_ef_search,
                ..VectorStoreOptions::default()
            },
        )?);

        let embedder = build_embedder(&config.embedder, config.performance.cache_size);
        // Fail fast per `spec.md §7`: a misconfigured or unreachable model
        // must surface as `EmbedderUnavailable` here, not as silent
        // all-zero vectors discovered later at search time.
        embedder.initialize().await?;

        let ingestor = Arc::new(Ingestor::new(
            root.clone(),
            store.clone(),
            embedder.clone(),
            config.clone(),
            &state_dir.join("file-hashes.json"),
        ));

        let retriever = HybridRetriever::new(store.clone(), embedder);

        Ok(Self { root, config, store, ingestor, retriever })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Indexes (or re-indexes) the whole workspace. See
    /// [`Ingestor::index_workspace`].
    pub async fn index(&self, force: bool) -> Result<()> {
        self.ingestor.index_workspace(force).await
    }

    /// Runs a hybrid search with the engine's configured defaults,
    /// overridden per-call by `options`.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        self.retriever.search(query, options).await
    }

    pub fn default_search_options(&self) -> SearchOptions {
        SearchOptions::from_config(&self.config.search)
    }

    /// Starts a debounced filesystem watcher feeding this engine's
    /// Ingestor. Must be called from within a `tokio` runtime. The returned
    /// [`Watcher`] stops watching when dropped.
    pub fn watch(&self, events: Option<broadcast::Sender<IndexEvent>>) -> Result<Watcher> {
        Watcher::start(
            self.root.clone(),
            self.ingestor.clone(),
            self.config.watch.debounce_ms,
            self.config.watch.ignored.clone(),
            events,
        )
    }

    /// Flushes the vector index and the hash cache to disk. Callers that
    /// run [`Engine::watch`] should invoke this on shutdown (e.g. after
    /// `Ctrl+C`) per `spec.md §5`'s cancellation rule.
    pub fn persist(&self) -> Result<()> {
        self.ingestor.persist()
    }

    pub fn total_blocks(&self) -> Result<u64> {
        self.store.catalog.total_blocks()
    }

    pub fn total_files(&self) -> Result<u64> {
        self.store.catalog.total_files()
    }
}
