//! The syntactic parser: a collaborator that turns source text into a parse
//! tree (`spec.md §6`). The Chunker only ever asks a tree for `{kind,
//! start_line, end_line, text, children, identifier_child}` — this module
//! is the one place that talks to `tree-sitter` directly, so swapping
//! grammars or adding a language never touches `chunker.rs`.

use tree_sitter::{Language, Parser as TsParser, Tree};

/// A successfully parsed file: the tree plus the source it was parsed from
/// (tree-sitter nodes borrow byte offsets, not text, so callers need both).
pub struct ParsedTree {
    pub tree: Tree,
    pub source: String,
}

impl ParsedTree {
    pub fn root(&self) -> Node<'_> {
        Node { inner: self.tree.root_node(), source: self.source.as_bytes() }
    }
}

/// A read-only view over a tree-sitter node, narrowed to exactly the surface
/// the Chunker needs.
#[derive(Clone, Copy)]
pub struct Node<'a> {
    inner: tree_sitter::Node<'a>,
    source: &'a [u8],
}

impl<'a> Node<'a> {
    pub fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    /// 1-based inclusive start line.
    pub fn start_line(&self) -> u32 {
        self.inner.start_position().row as u32 + 1
    }

    /// 1-based inclusive end line.
    pub fn end_line(&self) -> u32 {
        self.inner.end_position().row as u32 + 1
    }

    pub fn text(&self) -> &'a str {
        self.inner.utf8_text(self.source).unwrap_or("")
    }

    pub fn children(&self) -> Vec<Node<'a>> {
        let mut cursor = self.inner.walk();
        self.inner
            .children(&mut cursor)
            .map(|c| Node { inner: c, source: self.source })
            .collect()
    }

    /// The first child with kind `identifier` or `property_identifier`, per
    /// `spec.md §4.1`'s symbol-name rule.
    pub fn identifier_child(&self) -> Option<&'a str> {
        self.children()
            .into_iter()
            .find(|c| c.kind() == "identifier" || c.kind() == "property_identifier")
            .map(|c| c.text())
    }
}

/// Parses source text for a known language into a [`ParsedTree`].
///
/// Returns `None` for unrecognized languages or on a parser initialization
/// failure — the Chunker treats both as "no parse tree" and falls back to a
/// single `"file"`-kind Block, it never treats this as a hard error.
pub trait Parser: Send + Sync {
    fn parse(&self, source_text: &str, language: &str) -> Option<ParsedTree>;
}

/// The default collaborator: one `tree-sitter` grammar per supported
/// language, selected by the language tag the Scanner/lang detector assigns.
pub struct TreeSitterParser;

impl TreeSitterParser {
    pub fn new() -> Self {
        Self
    }

    fn language_for(tag: &str) -> Option<Language> {
        match tag {
            "rust" => Some(tree_sitter_rust::LANGUAGE.into()),
            "python" => Some(tree_sitter_python::LANGUAGE.into()),
            "javascript" => Some(tree_sitter_javascript::LANGUAGE.into()),
            "typescript" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            "tsx" => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            "go" => Some(tree_sitter_go::LANGUAGE.into()),
            "java" => Some(tree_sitter_java::LANGUAGE.into()),
            _ => None,
        }
    }
}

impl Default for TreeSitterParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for TreeSitterParser {
    fn parse(&self, source_text: &str, language: &str) -> Option<ParsedTree> {
        let lang = Self::language_for(language)?;
        let mut parser = TsParser::new();
        parser.set_language(&lang).ok()?;
        let tree = parser.parse(source_text, None)?;
        Some(ParsedTree { tree, source: source_text.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rust_function() {
        let parser = TreeSitterParser::new();
        let parsed = parser.parse("fn greet(name: &str) { println!(\"{}\", name); }", "rust");
        assert!(parsed.is_some());
        let parsed = parsed.unwrap();
        assert_eq!(parsed.root().kind(), "source_file");
    }

    #[test]
    fn unknown_language_returns_none() {
        let parser = TreeSitterParser::new();
        assert!(parser.parse("whatever", "cobol").is_none());
    }
}
