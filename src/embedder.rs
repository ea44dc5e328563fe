//! The embedding model collaborator (`spec.md §6`): `initialize()`, `embed()`,
//! `embed_batch()`, `dimensions()`, `model_name()`, `dispose()`.
//!
//! Two variants satisfy [`Embedder`], per the open question in `spec.md §9`:
//! [`LocalEmbedder`] (Qwen3-Embedding-0.6B via `fastembed`/`candle`,
//! in-process) and [`RemoteEmbedder`] (an HTTP service). Only one is active
//! per index — dimensionality is baked into persisted vectors — but both
//! are offered so a caller can pick per `embedder.provider`.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{DType, Device};
use fastembed::Qwen3TextEmbedding;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::warn;

use crate::config::EmbedderConfig;
use crate::error::{Error, Result};
use crate::hashing::sha256_hex;

/// `embed_batch`'s internal truncation budget: ≤ 2000 estimated tokens,
/// approximated here as 4 chars/token (distinct from the chunker's
/// `0.75 × words` estimator — `spec.md §9`'s third open question says not to
/// conflate the two).
const MAX_EMBED_TOKENS: usize = 2000;
const CHARS_PER_TOKEN: usize = 4;

/// Truncates `text` to the embedder's token budget, preferring to cut at the
/// last newline within the final 20% of the truncation window so a function
/// body isn't sliced mid-line.
pub fn truncate_for_embedding(text: &str) -> &str {
    let max_bytes = MAX_EMBED_TOKENS * CHARS_PER_TOKEN;
    if text.len() <= max_bytes {
        return text;
    }
    // `max_bytes`/`window_start` are byte offsets into a string that may
    // contain multi-byte UTF-8 characters, so snap both to the nearest
    // preceding char boundary before slicing.
    let max_bytes = floor_char_boundary(text, max_bytes);
    let window_start = floor_char_boundary(text, max_bytes - max_bytes / 5);
    match text[window_start..max_bytes].rfind('\n') {
        Some(offset) => &text[..window_start + offset],
        None => &text[..max_bytes],
    }
}

/// Largest byte index `<= index` that lies on a UTF-8 char boundary of
/// `text` (stable-Rust stand-in for the unstable `str::floor_char_boundary`).
fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// The embedding model collaborator. A single failed text within
/// `embed_batch` yields a zero vector for that text rather than failing the
/// whole batch — the block becomes discoverable only via keyword search
/// (`spec.md §4.5`/`§7`).
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>>;
    fn dimensions(&self) -> usize;
    fn model_name(&self) -> &str;
    async fn dispose(&self) -> Result<()> {
        Ok(())
    }
}

fn zero_vector(dims: usize) -> Vec<f32> {
    vec![0.0; dims]
}

/// Picks an [`Embedder`] implementation from `§6`'s `embedder.provider` key,
/// wrapped in the LRU cache both variants share. `cache_size` is
/// `performance.cache_size` (`spec.md §6`), not the embedding dimensionality.
pub fn build_embedder(cfg: &EmbedderConfig, cache_size: usize) -> Arc<dyn Embedder> {
    let inner: Arc<dyn Embedder> = match cfg.provider.as_str() {
        "remote" | "http" => Arc::new(RemoteEmbedder::new(cfg)),
        _ => Arc::new(LocalEmbedder::new(cfg)),
    };
    Arc::new(CachingEmbedder::new(inner, cache_size))
}

// ---------------------------------------------------------------------------
// Local (in-process) embedder
// ---------------------------------------------------------------------------

/// Qwen3-Embedding-0.6B loaded via `fastembed`'s `candle` backend (pure Rust,
/// no ONNX). One model instance serves this crate's single index.
pub struct LocalEmbedder {
    model: Mutex<Option<Qwen3TextEmbedding>>,
    model_name: String,
    dims: usize,
}

impl LocalEmbedder {
    pub fn new(cfg: &EmbedderConfig) -> Self {
        Self { model: Mutex::new(None), model_name: cfg.model.clone(), dims: cfg.dimensions }
    }

    fn embed_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let guard = self.model.lock();
        let model = guard
            .as_ref()
            .ok_or_else(|| Error::EmbedderUnavailable("local embedder not initialized".into()))?;
        model
            .embed(texts.to_vec())
            .map_err(|e| Error::EmbedderUnavailable(format!("Qwen3 embed failed: {e}")))
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn initialize(&self) -> Result<()> {
        if self.model.lock().is_some() {
            return Ok(());
        }
        let name = self.model_name.clone();
        let model = tokio::task::spawn_blocking(move || {
            Qwen3TextEmbedding::from_hf(&name, &Device::Cpu, DType::F32, 8192)
        })
        .await
        .map_err(|e| Error::EmbedderUnavailable(format!("init task panicked: {e}")))?
        .map_err(|e| Error::EmbedderUnavailable(format!("failed to load {}: {e}", self.model_name)))?;
        *self.model.lock() = Some(model);
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vecs = self.embed_batch(std::slice::from_ref(&text.to_string())).await;
        vecs.into_iter().next().ok_or_else(|| Error::EmbedderUnavailable("empty embed result".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let truncated: Vec<String> =
            texts.iter().map(|t| truncate_for_embedding(t).to_string()).collect();
        let dims = self.dims;
        match self.embed_sync(&truncated) {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!("local embedder batch failed, substituting zero vectors: {e}");
                truncated.iter().map(|_| zero_vector(dims)).collect()
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn dispose(&self) -> Result<()> {
        *self.model.lock() = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Remote HTTP embedder
// ---------------------------------------------------------------------------

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(serde::Deserialize)]
struct EmbedResponseRow {
    embedding: Vec<f32>,
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedResponseRow>,
}

/// An embedding service reached over HTTP (`embedder.baseUrl`). Per-text
/// failures within a batch degrade to zero vectors rather than failing the
/// request — `spec.md §6`.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    base_url: String,
    model_name: String,
    dims: usize,
}

impl RemoteEmbedder {
    pub fn new(cfg: &EmbedderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: cfg.base_url.clone().unwrap_or_else(|| "http://localhost:8080".to_string()),
            model_name: cfg.model.clone(),
            dims: cfg.dimensions,
        }
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn initialize(&self) -> Result<()> {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| Error::EmbedderUnavailable(format!("{} unreachable: {e}", self.base_url)))?;
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vecs = self.embed_batch(std::slice::from_ref(&text.to_string())).await;
        vecs.into_iter().next().ok_or_else(|| Error::EmbedderUnavailable("empty embed result".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let truncated: Vec<String> =
            texts.iter().map(|t| truncate_for_embedding(t).to_string()).collect();

        let request = EmbedRequest { model: &self.model_name, input: &truncated };
        let result: Result<Vec<Vec<f32>>> = async {
            let resp = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::EmbedderUnavailable(e.to_string()))?;
            let parsed: EmbedResponse =
                resp.json().await.map_err(|e| Error::EmbedderUnavailable(e.to_string()))?;
            Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
        }
        .await;

        match result {
            Ok(vectors) if vectors.len() == truncated.len() => vectors,
            Ok(_) => {
                warn!("remote embedder returned a mismatched row count, substituting zero vectors");
                truncated.iter().map(|_| zero_vector(self.dims)).collect()
            }
            Err(e) => {
                warn!("remote embedder batch failed, substituting zero vectors: {e}");
                truncated.iter().map(|_| zero_vector(self.dims)).collect()
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// ---------------------------------------------------------------------------
// Caching wrapper
// ---------------------------------------------------------------------------

/// Wraps any [`Embedder`] with a content-hash-keyed LRU cache, so repeated
/// ingestion of identical fragments (templated boilerplate, re-chunked
/// overlap windows) doesn't re-pay the embedding cost.
///
/// `spec.md §9`'s second open question flags the source's "evict the first
/// key" cache as only approximately LRU; this uses a real `lru::LruCache`
/// instead of preserving that quirk.
pub struct CachingEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size.max(1)).unwrap();
        Self { inner, cache: Mutex::new(LruCache::new(capacity)) }
    }

    fn with_capacity(inner: Arc<dyn Embedder>, capacity: usize) -> Self {
        Self::new(inner, capacity.max(1))
    }
}

#[async_trait]
impl Embedder for CachingEmbedder {
    async fn initialize(&self) -> Result<()> {
        self.inner.initialize().await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = sha256_hex(text.as_bytes());
        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok(hit.clone());
        }
        let vector = self.inner.embed(text).await?;
        self.cache.lock().put(key, vector.clone());
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<(usize, String)> = Vec::new();

        {
            let mut cache = self.cache.lock();
            for (i, text) in texts.iter().enumerate() {
                let key = sha256_hex(text.as_bytes());
                if let Some(hit) = cache.get(&key) {
                    results[i] = Some(hit.clone());
                } else {
                    misses.push((i, text.clone()));
                }
            }
        }

        if !misses.is_empty() {
            let miss_texts: Vec<String> = misses.iter().map(|(_, t)| t.clone()).collect();
            let embedded = self.inner.embed_batch(&miss_texts).await;
            let mut cache = self.cache.lock();
            for ((i, text), vector) in misses.into_iter().zip(embedded.into_iter()) {
                let key = sha256_hex(text.as_bytes());
                cache.put(key, vector.clone());
                results[i] = Some(vector);
            }
        }

        let dims = self.inner.dimensions();
        results.into_iter().map(|r| r.unwrap_or_else(|| zero_vector(dims))).collect()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn dispose(&self) -> Result<()> {
        self.cache.lock().clear();
        self.inner.dispose().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder {
        dims: usize,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn initialize(&self) -> Result<()> {
            Ok(())
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(self.embed_batch(std::slice::from_ref(&text.to_string())).await.remove(0))
        }
        async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            texts.iter().map(|t| vec![t.len() as f32; self.dims]).collect()
        }
        fn dimensions(&self) -> usize {
            self.dims
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn caching_embedder_skips_repeat_calls() {
        let inner = Arc::new(FixedEmbedder { dims: 4, calls: 0.into() });
        let cached = CachingEmbedder::with_capacity(inner.clone(), 16);

        let first = cached.embed_batch(&["hello".to_string(), "hello".to_string()]).await;
        assert_eq!(first[0], first[1]);
        assert_eq!(inner.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let second = cached.embed_batch(&["hello".to_string()]).await;
        assert_eq!(second[0], first[0]);
        // No new embed_batch call: the single text was already cached.
        assert_eq!(inner.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn truncate_keeps_short_text_untouched() {
        let text = "fn main() {}";
        assert_eq!(truncate_for_embedding(text), text);
    }

    #[test]
    fn truncate_cuts_long_text_at_budget() {
        let text = "x".repeat(MAX_EMBED_TOKENS * CHARS_PER_TOKEN * 2);
        let truncated = truncate_for_embedding(&text);
        assert!(truncated.len() <= MAX_EMBED_TOKENS * CHARS_PER_TOKEN);
    }
}
