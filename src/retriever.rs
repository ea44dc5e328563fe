//! `HybridRetriever`: runs vector and keyword retrieval in parallel, fuses,
//! boosts, filters, and re-ranks (`spec.md §4.6`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::config::SearchConfig;
use crate::embedder::Embedder;
use crate::error::Result;
use crate::hashing::sha256_hex;
use crate::model::{now_ms, Block, SearchStat};
use crate::query_expander::QueryExpander;
use crate::scorer;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub language: Option<String>,
    pub block_type: Option<String>,
    pub min_score: Option<f32>,
    pub semantic_only: bool,
    pub keyword_only: bool,
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    pub rerank: bool,
}

impl SearchOptions {
    pub fn from_config(cfg: &SearchConfig) -> Self {
        Self {
            limit: cfg.max_results,
            language: None,
            block_type: None,
            min_score: Some(cfg.min_score),
            semantic_only: false,
            keyword_only: false,
            semantic_weight: cfg.hybrid_weight.semantic,
            keyword_weight: cfg.hybrid_weight.keyword,
            rerank: cfg.rerank,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub block_id: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub block_type: String,
    pub language: String,
    pub symbol_name: Option<String>,
    pub score: f32,
    pub semantic_score: f32,
    pub keyword_score: f32,
}

struct Candidate {
    block: Block,
    semantic_score: f32,
    keyword_score: f32,
}

pub struct HybridRetriever {
    store: Arc<Store>,
    embedder: Arc<dyn Embedder>,
    expander: QueryExpander,
}

impl HybridRetriever {
    pub fn new(store: Arc<Store>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder, expander: QueryExpander::new() }
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        let start = Instant::now();

        // Invariant 5 (`spec.md §8`): both channels disabled → empty, no error.
        if options.semantic_only && options.keyword_only {
            return Ok(Vec::new());
        }

        let fan_out = options.limit.max(1) * 2;
        let mut candidates: HashMap<String, Candidate> = HashMap::new();

        if !options.keyword_only {
            let query_vector = self.embedder.embed(query).await?;
            for (block_id, score) in self.store.vector_search(&query_vector, fan_out)? {
                if let Some(block) = self.store.catalog.get_block(&block_id)? {
                    candidates
                        .entry(block_id)
                        .and_modify(|c| c.semantic_score = c.semantic_score.max(score))
                        .or_insert(Candidate { block, semantic_score: score, keyword_score: 0.0 });
                }
            }
        }

        if !options.semantic_only {
            let mut keyword_hits: HashMap<String, f32> = HashMap::new();
            for variant in self.expander.expand(query) {
                for (block_id, raw_score) in self.store.keyword.search(&variant, fan_out)? {
                    // BM25 score normalized to [0, 1] per `spec.md §4.6` stage 2.
                    let normalized = (raw_score / 10.0).min(1.0).max(0.0);
                    keyword_hits
                        .entry(block_id)
                        .and_modify(|s| *s = s.max(normalized))
                        .or_insert(normalized);
                }
            }
            for (block_id, score) in keyword_hits {
                if let Some(block) = self.store.catalog.get_block(&block_id)? {
                    candidates
                        .entry(block_id)
                        .and_modify(|c| c.keyword_score = c.keyword_score.max(score))
                        .or_insert(Candidate { block, semantic_score: 0.0, keyword_score: score });
                }
            }
        }

        let recent_files = self.store.catalog.recent_files(10)?;
        let language_shares = language_shares(&self.store)?;

        let w_s = options.semantic_weight;
        let w_k = options.keyword_weight;
        let denom = (w_s + w_k).max(f32::EPSILON);

        let mut scored: Vec<(f32, Candidate)> = candidates
            .into_values()
            .map(|c| {
                let fused = (c.semantic_score * w_s + c.keyword_score * w_k) / denom;
                let share = language_shares.get(&c.block.language).copied().unwrap_or(0.0);
                let boosted = scorer::apply_boosts(
                    fused,
                    query,
                    &c.block,
                    &recent_files,
                    share,
                    c.semantic_score,
                    c.keyword_score,
                );
                (boosted, c)
            })
            .collect();

        // Filtering (stage 5): applied after boosting.
        scored.retain(|(score, c)| {
            options.language.as_deref().map(|l| l == c.block.language).unwrap_or(true)
                && options.block_type.as_deref().map(|t| t == c.block.block_type).unwrap_or(true)
                && options.min_score.map(|min| *score >= min).unwrap_or(true)
        });

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(options.limit);

        if options.rerank && scored.len() > 1 {
            let mut reranked: Vec<(f32, Candidate)> = scored
                .into_iter()
                .map(|(score, c)| {
                    let factor = scorer::rerank_factor(query, &c.block, c.semantic_score, c.keyword_score);
                    ((score * factor).min(1.0), c)
                })
                .collect();
            reranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            scored = reranked;
        }

        let hits: Vec<SearchHit> = scored
            .into_iter()
            .map(|(score, c)| SearchHit {
                block_id: c.block.block_id,
                file_path: c.block.file_path,
                start_line: c.block.start_line,
                end_line: c.block.end_line,
                content: c.block.content,
                block_type: c.block.block_type,
                language: c.block.language,
                symbol_name: c.block.symbol_name,
                score,
                semantic_score: c.semantic_score,
                keyword_score: c.keyword_score,
            })
            .collect();

        self.record_stat(query, &hits, start.elapsed().as_millis() as u64)?;
        Ok(hits)
    }

    fn record_stat(&self, query: &str, hits: &[SearchHit], elapsed_ms: u64) -> Result<()> {
        let avg_score = if hits.is_empty() {
            0.0
        } else {
            hits.iter().map(|h| h.score).sum::<f32>() / hits.len() as f32
        };
        self.store.catalog.record_search_stat(&SearchStat {
            query_hash: sha256_hex(query.as_bytes()),
            query: query.to_string(),
            result_count: hits.len() as u32,
            avg_score,
            execution_time_ms: elapsed_ms,
            timestamp: now_ms(),
        })
    }
}

fn language_shares(store: &Store) -> Result<HashMap<String, f32>> {
    let distribution = store.catalog.language_distribution()?;
    let total: u64 = distribution.iter().map(|(_, c)| *c).sum();
    if total == 0 {
        return Ok(HashMap::new());
    }
    Ok(distribution.into_iter().map(|(lang, count)| (lang, count as f32 / total as f32)).collect())
}

/// Holds `recent_files` as a reusable type alias for callers that want to
/// precompute it once across multiple searches.
pub type RecentFiles = HashSet<String>;
