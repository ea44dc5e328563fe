//! Rewrites a user query into alternative surface forms before keyword
//! retrieval (`spec.md §4.6` stage 1). Semantic retrieval only ever embeds
//! the original query — expansion exists to widen BM25 recall across
//! naming conventions and common code-search synonyms.

use std::collections::HashSet;
use std::sync::LazyLock;

/// `token -> synonyms`, both directions implied: looking up any member of a
/// group yields the rest of the group.
static SYNONYMS: LazyLock<Vec<&'static [&'static str]>> = LazyLock::new(|| {
    vec![
        &["auth", "authentication", "login", "signin", "credential"],
        &["fetch", "get", "retrieve", "load", "request", "api"],
        &["error", "exception", "failure", "err"],
        &["user", "account", "profile"],
        &["data", "payload", "record"],
        &["create", "add", "insert", "new"],
        &["update", "edit", "modify", "patch"],
        &["delete", "remove", "destroy"],
        &["find", "search", "lookup", "query"],
        &["list", "enumerate", "collect"],
        &["render", "draw", "display"],
        &["connect", "open", "dial"],
        &["send", "emit", "publish", "dispatch"],
        &["receive", "consume", "subscribe", "listen"],
    ]
});

/// Multi-word code-pattern substitutions, applied as whole-phrase matches
/// against the lowercased query.
static PHRASE_SUBSTITUTIONS: LazyLock<Vec<(&'static str, &'static [&'static str])>> =
    LazyLock::new(|| {
        vec![
            ("error handler", &["try catch", "exception handling", "catch block"]),
            ("try catch", &["error handler", "exception handling"]),
            ("exception handling", &["error handler", "try catch", "catch block"]),
        ]
    });

pub struct QueryExpander;

impl QueryExpander {
    pub fn new() -> Self {
        Self
    }

    /// Produces the original query plus its camelCase/snake_case/kebab-case
    /// splits (lowercased), synonym substitutions, and phrase substitutions.
    /// Order is insertion order with duplicates removed; the original query
    /// is always first.
    pub fn expand(&self, query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut push = |s: String| {
            let trimmed = s.trim().to_string();
            if !trimmed.is_empty() && seen.insert(trimmed.clone()) {
                out.push(trimmed);
            }
        };

        push(query.to_string());

        for split in identifier_splits(query) {
            push(split);
        }

        let lower = query.to_lowercase();
        let tokens: Vec<&str> = lower.split_whitespace().collect();
        for token in &tokens {
            for group in SYNONYMS.iter() {
                if group.contains(token) {
                    for synonym in *group {
                        if synonym != token {
                            let replaced =
                                tokens.iter().map(|t| if t == token { synonym } else { t }).collect::<Vec<_>>().join(" ");
                            push(replaced);
                        }
                    }
                }
            }
        }

        for (phrase, substitutions) in PHRASE_SUBSTITUTIONS.iter() {
            if lower.contains(phrase) {
                for substitution in *substitutions {
                    push(lower.replace(phrase, substitution));
                }
            }
        }

        out
    }
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a camelCase, snake_case, or kebab-case identifier-like query into
/// a lowercased, space-separated form. Returns an empty vec (no-op) for
/// queries that are already plain words.
fn identifier_splits(query: &str) -> Vec<String> {
    let mut splits = Vec::new();

    if query.contains('_') || query.contains('-') {
        let words: Vec<&str> = query.split(['_', '-']).filter(|w| !w.is_empty()).collect();
        if words.len() > 1 {
            splits.push(words.join(" ").to_lowercase());
        }
    }

    let camel = split_camel_case(query);
    if camel.len() > 1 {
        splits.push(camel.join(" ").to_lowercase());
    }

    splits
}

fn split_camel_case(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for ch in s.chars() {
        if ch.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_always_includes_original_first() {
        let expander = QueryExpander::new();
        let expanded = expander.expand("getUserById");
        assert_eq!(expanded[0], "getUserById");
    }

    #[test]
    fn camel_case_is_split() {
        let expander = QueryExpander::new();
        let expanded = expander.expand("getUserById");
        assert!(expanded.iter().any(|s| s == "get user by id"));
    }

    #[test]
    fn snake_case_is_split() {
        let expander = QueryExpander::new();
        let expanded = expander.expand("fetch_user_id");
        assert!(expanded.iter().any(|s| s == "fetch user id"));
    }

    #[test]
    fn synonyms_are_substituted() {
        let expander = QueryExpander::new();
        let expanded = expander.expand("auth handler");
        assert!(expanded.iter().any(|s| s.contains("authentication")));
        assert!(expanded.iter().any(|s| s.contains("login")));
    }

    #[test]
    fn phrase_substitution_applies() {
        let expander = QueryExpander::new();
        let expanded = expander.expand("error handler");
        assert!(expanded.iter().any(|s| s.contains("try catch")));
    }

    #[test]
    fn plain_single_word_has_no_splits() {
        let expander = QueryExpander::new();
        let expanded = expander.expand("widget");
        assert_eq!(expanded, vec!["widget".to_string()]);
    }
}
