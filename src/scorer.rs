//! Deterministic boost and re-rank functions (`spec.md §4.6` stages 4 and 7).
//! Pure functions over [`crate::model::Block`] metadata plus the retrieval
//! channel scores — no I/O, so they're trivial to unit test in isolation
//! from the stores they're normally fed by.

use std::collections::HashSet;

use crate::model::Block;

const FUNCTION_LIKE: &[&str] = &[
    "function_declaration",
    "function_expression",
    "arrow_function",
    "method_definition",
    "function_definition",
    "function_item",
    "method_declaration",
];
const CLASS_LIKE: &[&str] =
    &["class_declaration", "class_expression", "class_definition", "struct_item"];
const INTERFACE_OR_TYPE_ALIAS: &[&str] = &["interface_declaration", "type_alias_declaration"];
const ENUM_LIKE: &[&str] = &["enum_declaration", "enum_item"];
const DECORATED: &[&str] = &["decorated_definition"];

/// Symbol-name boost: exact match (case-insensitive) × 1.5; query ⊂ symbol
/// × 1.3; symbol ⊂ query × 1.2; no symbol or no overlap → 1.0.
pub fn symbol_boost(query: &str, symbol_name: Option<&str>) -> f32 {
    let Some(symbol) = symbol_name else { return 1.0 };
    let query_lower = query.to_lowercase();
    let symbol_lower = symbol.to_lowercase();
    if query_lower == symbol_lower {
        1.5
    } else if symbol_lower.contains(&query_lower) {
        1.3
    } else if query_lower.contains(&symbol_lower) {
        1.2
    } else {
        1.0
    }
}

/// File-path boost: query ⊂ full path × 1.3; query ⊂ basename × 1.2; no
/// overlap → 1.0.
pub fn file_path_boost(query: &str, file_path: &str) -> f32 {
    let query_lower = query.to_lowercase();
    let path_lower = file_path.to_lowercase();
    let basename_lower = file_path
        .rsplit('/')
        .next()
        .unwrap_or(file_path)
        .to_lowercase();
    if path_lower.contains(&query_lower) {
        1.3
    } else if basename_lower.contains(&query_lower) {
        1.2
    } else {
        1.0
    }
}

/// Recency boost: 1.25 if `file_path` is in the "recent" set, else 1.0.
pub fn recency_boost(file_path: &str, recent_files: &HashSet<String>) -> f32 {
    if recent_files.contains(file_path) {
        1.25
    } else {
        1.0
    }
}

/// Block-type boost table from `spec.md §4.6`.
pub fn block_type_boost(block_type: &str) -> f32 {
    if FUNCTION_LIKE.contains(&block_type) {
        1.3
    } else if DECORATED.contains(&block_type) {
        1.25
    } else if CLASS_LIKE.contains(&block_type) {
        1.2
    } else if INTERFACE_OR_TYPE_ALIAS.contains(&block_type) {
        1.15
    } else if ENUM_LIKE.contains(&block_type) {
        1.1
    } else if block_type == "file" {
        0.95
    } else {
        1.0
    }
}

/// Language-distribution boost: >50% of the corpus × 1.1; >20% × 1.05;
/// <5% × 0.95; otherwise 1.0. `language_share` is this block's language's
/// fraction of `total_blocks` (already computed by the caller).
pub fn language_distribution_boost(language_share: f32) -> f32 {
    if language_share > 0.5 {
        1.1
    } else if language_share > 0.2 {
        1.05
    } else if language_share < 0.05 {
        0.95
    } else {
        1.0
    }
}

/// Channel-balance boost: both channels strong → 1.2; either channel very
/// strong → 1.1; both channels weak → 0.8; otherwise 1.0.
pub fn channel_balance_boost(semantic_score: f32, keyword_score: f32) -> f32 {
    if semantic_score > 0.7 && keyword_score > 0.7 {
        1.2
    } else if semantic_score > 0.8 || keyword_score > 0.8 {
        1.1
    } else if semantic_score < 0.3 && keyword_score < 0.3 {
        0.8
    } else {
        1.0
    }
}

/// Applies every boost factor from `spec.md §4.6` stage 4 to `fused_score`.
#[allow(clippy::too_many_arguments)]
pub fn apply_boosts(
    fused_score: f32,
    query: &str,
    block: &Block,
    recent_files: &HashSet<String>,
    language_share: f32,
    semantic_score: f32,
    keyword_score: f32,
) -> f32 {
    fused_score
        * symbol_boost(query, block.symbol_name.as_deref())
        * file_path_boost(query, &block.file_path)
        * recency_boost(&block.file_path, recent_files)
        * block_type_boost(&block.block_type)
        * language_distribution_boost(language_share)
        * channel_balance_boost(semantic_score, keyword_score)
}

/// Re-rank factors from `spec.md §4.6` stage 7, multiplied together and
/// clipped to `≤ 1.0` by the caller after multiplying into the boosted
/// score.
pub fn rerank_factor(query: &str, block: &Block, semantic_score: f32, keyword_score: f32) -> f32 {
    let query_lower = query.to_lowercase();
    let content_lower = block.content.to_lowercase();

    let mut factor = 1.0;

    if let Some(symbol) = &block.symbol_name {
        let symbol_lower = symbol.to_lowercase();
        if symbol_lower == query_lower {
            factor *= 1.5;
        } else if symbol_lower.contains(&query_lower) {
            factor *= 1.2;
        }
    }

    if content_lower.contains(&query_lower) {
        factor *= 1.1;
    }

    let matches = query_lower
        .split_whitespace()
        .filter(|t| t.len() > 2 && content_lower.contains(t))
        .count();
    factor *= 1.0 + 0.05 * matches as f32;

    if semantic_score > 0.8 && keyword_score > 0.5 {
        factor *= 1.15;
    }

    if FUNCTION_LIKE.contains(&block.block_type.as_str()) {
        factor *= 1.05;
    }

    if block.content.lines().count() > 50 {
        factor *= 0.95;
    }

    factor
}
