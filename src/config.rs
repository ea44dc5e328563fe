use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Maximum allowed length for a raw search query (characters), before
/// QueryExpander ever sees it.
pub const MAX_SEARCH_QUERY_LENGTH: usize = 1000;

/// Canonical list of file extensions considered indexable. The Scanner,
/// KeywordStore, and the embedding pipeline all consult this single list so
/// they never diverge on what counts as "a code file".
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs",
    "rs", "py", "go", "java", "c", "cpp", "h", "hpp",
    "cs", "rb", "php", "swift", "kt", "scala",
    "html", "css", "scss", "less", "sass",
    "json", "yaml", "yml", "toml", "xml",
    "md", "mdx", "txt", "rst",
    "sql", "graphql", "gql",
];

pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&ext)
}

/// Directory names that are never descended into regardless of ignore rules.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    "node_modules", ".git", "dist", "build", "coverage", ".next", ".nuxt",
    "target", "bin", "obj", ".syntheo",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub base_url: Option<String>,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: "Qwen/Qwen3-Embedding-0.6B".to_string(),
            dimensions: 1024,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    pub chunk_tokens: usize,
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    pub max_file_size: u64,
    pub exclude_patterns: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            concurrency: 4,
            chunk_tokens: 384,
            max_tokens: 1536,
            overlap_tokens: 50,
            max_file_size: 1024 * 1024,
            exclude_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridWeightConfig {
    pub semantic: f32,
    pub keyword: f32,
}

impl Default for HybridWeightConfig {
    fn default() -> Self {
        Self { semantic: 0.7, keyword: 0.3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
    pub min_score: f32,
    pub hybrid_weight: HybridWeightConfig,
    pub rerank: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 20,
            min_score: 0.3,
            hybrid_weight: HybridWeightConfig::default(),
            rerank: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    pub debounce_ms: u64,
    pub ignored: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { enabled: true, debounce_ms: 500, ignored: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub hnsw_ef_search: usize,
    pub cache_size: usize,
    pub log_level: String,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            hnsw_ef_search: 100,
            cache_size: 10_000,
            log_level: "info".to_string(),
        }
    }
}

/// Top-level configuration, persisted as `<workspace>/.syntheo/semantics/config.json`.
///
/// Who writes this file and any migration UI for it is an external
/// collaborator; this type only reads and defaults it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub embedder: EmbedderConfig,
    pub indexing: IndexingConfig,
    pub search: SearchConfig,
    pub watch: WatchConfig,
    pub performance: PerformanceConfig,
}

impl Config {
    /// Read `path` if it exists and parses; otherwise fall back to defaults.
    /// A malformed config file is not a `StoreCorruption` — it is silently
    /// superseded by defaults, matching the forgiving posture `spec.md §7`
    /// assigns to configuration in general.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
