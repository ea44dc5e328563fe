//! Splits a parse tree into syntactically-bounded [`Block`]s, per
//! `spec.md §4.1`.

use std::sync::LazyLock;

use regex::Regex;

use crate::hashing::{block_id, content_hash};
use crate::model::{now_ms, Block};
use crate::parser::{Node, ParsedTree};

/// Semantic node kinds per language. Extend freely — a kind not listed here
/// is simply never the root of its own Block; it still appears in some
/// ancestor's or the fallback's content.
fn semantic_kinds(language: &str) -> &'static [&'static str] {
    match language {
        "typescript" | "tsx" | "javascript" => &[
            "function_declaration",
            "function_expression",
            "arrow_function",
            "class_declaration",
            "class_expression",
            "method_definition",
            "interface_declaration",
            "type_alias_declaration",
            "enum_declaration",
        ],
        "python" => &["function_definition", "class_definition", "decorated_definition"],
        "rust" => &[
            "function_item",
            "struct_item",
            "enum_item",
            "trait_item",
            "impl_item",
            "mod_item",
        ],
        "go" => &["function_declaration", "method_declaration", "type_declaration"],
        "java" => &["method_declaration", "class_declaration", "interface_declaration", "enum_declaration"],
        _ => &[],
    }
}

static RE_TS_JS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?m)^(?:export\s+)?(?:async\s+)?function\s+(\w+)").unwrap(),
        Regex::new(r"(?m)^(?:export\s+)?class\s+(\w+)").unwrap(),
        Regex::new(r"(?m)^(?:export\s+)?(?:default\s+)?const\s+(\w+)\s*=").unwrap(),
    ]
});
static RE_PYTHON: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?m)^(?:async\s+)?def\s+(\w+)").unwrap(),
        Regex::new(r"(?m)^class\s+(\w+)").unwrap(),
    ]
});
static RE_GENERIC: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?m)^#{1,3}\s+(.+)$").unwrap(),
        Regex::new(r"(?m)^\[(.+?)\]").unwrap(),
    ]
});

/// Best-effort single symbol name for a file with no registered grammar
/// (e.g. `.md`, `.json`, `.sql`) — improves keyword recall on non-code files
/// without requiring a parser. Only ever runs on the whole-file fallback
/// block, never on a parsed tree's own nodes.
fn fallback_symbol_name(content: &str, language: &str) -> Option<String> {
    let regexes: &[Regex] = match language {
        "typescript" | "javascript" => &RE_TS_JS,
        "python" => &RE_PYTHON,
        "markdown" => &RE_GENERIC,
        _ => return None,
    };
    regexes
        .iter()
        .find_map(|re| re.captures(content))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// `ceil(0.75 × whitespace_word_count)` — retained for chunking sizing math
/// only; embedder-side truncation uses a separate chars-per-token estimate.
pub fn estimate_tokens(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    ((words as f64) * 0.75).ceil() as u32
}

pub struct ChunkOptions {
    pub target_tokens: u32,
    pub max_tokens: u32,
    pub overlap_tokens: u32,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self { target_tokens: 384, max_tokens: 1536, overlap_tokens: 50 }
    }
}

/// Converts `(file_path, source_text, parse_tree_root, language)` into an
/// ordered list of Blocks.
pub struct Chunker {
    opts: ChunkOptions,
}

impl Chunker {
    pub fn new(opts: ChunkOptions) -> Self {
        Self { opts }
    }

    /// Entry point: chunk a parsed file. `parsed` is `None` when the file
    /// has no recognized grammar or failed to parse — the fallback path
    /// below handles that the same way it handles a tree with zero semantic
    /// nodes in it.
    pub fn chunk_file(
        &self,
        file_path: &str,
        source_text: &str,
        language: &str,
        parsed: Option<&ParsedTree>,
    ) -> Vec<Block> {
        let mut raw_blocks: Vec<RawBlock> = Vec::new();
        if let Some(parsed) = parsed {
            self.walk(parsed.root(), language, None, &mut raw_blocks);
        }

        if raw_blocks.is_empty() {
            raw_blocks.push(RawBlock {
                block_type: "file".to_string(),
                start_line: 1,
                end_line: source_text.lines().count().max(1) as u32,
                text: source_text.to_string(),
                symbol_name: fallback_symbol_name(source_text, language),
                parent_symbol: None,
            });
        }

        // Raw blocks are independent of one another by this point (the
        // depth-first walk that produced them has already finished), so
        // sizing/splitting each one is embarrassingly parallel; `collect`
        // preserves source order.
        use rayon::prelude::*;
        raw_blocks
            .into_par_iter()
            .map(|raw| self.emit_sized(file_path, language, raw))
            .flatten_iter()
            .collect()
    }

    /// Depth-first walk. Semantic nodes emit a [`RawBlock`] and recurse only
    /// into their non-semantic children, threading the emitted node's
    /// symbol name down as `parent_symbol`. Non-semantic nodes recurse into
    /// every child unchanged.
    fn walk(&self, node: Node<'_>, language: &str, parent_symbol: Option<String>, out: &mut Vec<RawBlock>) {
        let kinds = semantic_kinds(language);
        if kinds.contains(&node.kind()) {
            let symbol_name = node.identifier_child().map(|s| s.to_string());
            out.push(RawBlock {
                block_type: node.kind().to_string(),
                start_line: node.start_line(),
                end_line: node.end_line(),
                text: node.text().to_string(),
                symbol_name: symbol_name.clone(),
                parent_symbol: parent_symbol.clone(),
            });
            // A semantic node's children are walked the same way regardless
            // of their own kind: nested semantic nodes become separate
            // Blocks carrying this node's symbol as their `parent_symbol`;
            // non-semantic children (statement bodies, parameter lists) are
            // transparent wrappers the walk passes through.
            let next_parent = symbol_name.or(parent_symbol);
            for child in node.children() {
                self.walk(child, language, next_parent.clone(), out);
            }
        } else {
            for child in node.children() {
                self.walk(child, language, parent_symbol.clone(), out);
            }
        }
    }

    /// Applies the sizing policy to one raw (unbounded) block, possibly
    /// splitting it into several sub-Blocks sharing a `parent_symbol`.
    fn emit_sized(&self, file_path: &str, language: &str, raw: RawBlock) -> Vec<Block> {
        let mut out = Vec::new();
        let total_tokens = estimate_tokens(&raw.text);
        if total_tokens <= self.opts.max_tokens {
            let parent_symbol = raw.parent_symbol.clone();
            out.push(self.make_block(
                file_path, language, &raw, &raw.text, raw.start_line, raw.end_line, 0, parent_symbol,
            ));
            return out;
        }

        // Sub-blocks of a split node carry the node's own symbol name as
        // `parent_symbol` (the enclosing function/class the split came from),
        // not the grandparent context the un-split node would have used.
        let split_parent_symbol = raw.symbol_name.clone().or_else(|| raw.parent_symbol.clone());

        let lines: Vec<&str> = raw.text.split('\n').collect();
        let total_lines = lines.len();
        let mut cursor = 0usize;
        let mut chunk_index = 0u32;

        while cursor < total_lines {
            let mut acc = 0u32;
            let mut cursor_end = cursor;
            while cursor_end < total_lines {
                acc += estimate_tokens(lines[cursor_end]);
                cursor_end += 1;
                if acc >= self.opts.target_tokens {
                    break;
                }
            }

            let window_start = extend_backward(&lines, cursor, self.opts.overlap_tokens);
            let window_end = extend_forward(&lines, cursor_end, self.opts.overlap_tokens);

            let window_text = lines[window_start..window_end].join("\n");
            let abs_start = raw.start_line + window_start as u32;
            let abs_end = raw.start_line + window_end as u32 - 1;
            out.push(self.make_block(
                file_path,
                language,
                &raw,
                &window_text,
                abs_start,
                abs_end,
                chunk_index,
                split_parent_symbol.clone(),
            ));

            chunk_index += 1;
            if cursor_end >= total_lines {
                break;
            }
            // Advance to the window's end, carrying `overlap_tokens` worth
            // of trailing context into the next window's start.
            cursor = if window_end > cursor { window_end } else { cursor_end };
        }
        out
    }

    fn make_block(
        &self,
        file_path: &str,
        language: &str,
        raw: &RawBlock,
        text: &str,
        start_line: u32,
        end_line: u32,
        chunk_index: u32,
        parent_symbol: Option<String>,
    ) -> Block {
        let now = now_ms();
        Block {
            block_id: block_id(file_path, start_line, end_line, &raw.block_type, chunk_index),
            file_path: file_path.to_string(),
            start_line,
            end_line,
            content: text.to_string(),
            content_hash: content_hash(text),
            block_type: raw.block_type.clone(),
            language: language.to_string(),
            symbol_name: raw.symbol_name.clone(),
            parent_symbol,
            tokens: estimate_tokens(text),
            chunk_index,
            created_at: now,
            updated_at: now,
        }
    }
}

struct RawBlock {
    block_type: String,
    start_line: u32,
    end_line: u32,
    text: String,
    symbol_name: Option<String>,
    parent_symbol: Option<String>,
}

fn extend_backward(lines: &[&str], idx: usize, token_budget: u32) -> usize {
    let mut acc = 0u32;
    let mut i = idx;
    while i > 0 {
        let prev = i - 1;
        acc += estimate_tokens(lines[prev]);
        if acc > token_budget {
            break;
        }
        i = prev;
    }
    i
}

fn extend_forward(lines: &[&str], idx: usize, token_budget: u32) -> usize {
    let mut acc = 0u32;
    let mut i = idx;
    while i < lines.len() {
        acc += estimate_tokens(lines[i]);
        if acc > token_budget {
            break;
        }
        i += 1;
    }
    i
}
