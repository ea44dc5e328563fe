//! Extension-to-language-tag mapping shared by the Scanner, Chunker, and
//! ResultScorer's language-distribution boost.

/// Maps a lowercase extension (without the leading dot) to a language tag.
/// Unrecognized extensions map to `"plaintext"` rather than failing — an
/// unrecognized language just means the Chunker falls back to a single
/// `"file"`-kind Block.
pub fn detect_language(ext: &str) -> &'static str {
    match ext {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "rs" => "rust",
        "py" | "pyi" | "pyw" => "python",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "hpp" | "cc" | "cxx" | "hxx" => "cpp",
        "cs" => "csharp",
        "rb" | "rake" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "scala" | "sc" => "scala",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" | "sass" | "less" => "scss",
        "json" | "jsonc" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" | "xsl" | "xslt" => "xml",
        "md" | "mdx" | "rst" => "markdown",
        "sql" => "sql",
        "graphql" | "gql" => "graphql",
        "txt" => "plaintext",
        _ => "plaintext",
    }
}

/// Extension used by the tree-sitter [`crate::parser::TreeSitterParser`]:
/// only languages with a registered grammar are worth distinguishing
/// `tsx` from `typescript` for (the grammar itself differs); everything
/// else collapses to its `detect_language` tag.
pub fn parser_language_tag(ext: &str) -> &'static str {
    if ext == "tsx" {
        "tsx"
    } else {
        detect_language(ext)
    }
}
