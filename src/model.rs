use serde::{Deserialize, Serialize};

/// The indexing unit: a syntactically-bounded fragment of a source file.
///
/// `block_id` is recomputed from identity fields on every ingest rather than
/// stored independently of them — see [`crate::hashing::block_id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub block_id: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub content_hash: String,
    pub block_type: String,
    pub language: String,
    pub symbol_name: Option<String>,
    pub parent_symbol: Option<String>,
    pub tokens: u32,
    pub chunk_index: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Per-file summary row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_path: String,
    pub file_hash: String,
    pub language: String,
    pub size_bytes: u64,
    pub line_count: u32,
    pub last_indexed: i64,
    pub block_count: u32,
    pub is_deleted: bool,
}

/// Change-detection record held by the HashCache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content_hash: String,
    pub mtime_ms: i64,
    pub size_bytes: u64,
}

/// A vector paired with its ANN label, prior to insertion.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub label: u64,
    pub vector: Vec<f32>,
}

/// Append-only observability row recorded after each retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStat {
    pub query_hash: String,
    pub query: String,
    pub result_count: u32,
    pub avg_score: f32,
    pub execution_time_ms: u64,
    pub timestamp: i64,
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
