use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes, as a lowercase hex digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Stable block identity: first 16 hex chars of
/// `SHA-256(file_path | start_line | end_line | block_type | chunk_index)`.
///
/// Deterministic in its inputs (`spec.md §8` invariant 3) and therefore safe
/// to recompute on every ingest rather than storing it as mutable state.
pub fn block_id(
    file_path: &str,
    start_line: u32,
    end_line: u32,
    block_type: &str,
    chunk_index: u32,
) -> String {
    let key = format!("{file_path}|{start_line}|{end_line}|{block_type}|{chunk_index}");
    let full = sha256_hex(key.as_bytes());
    full[..16].to_string()
}

/// `content_hash` field of a Block / file: SHA-256 over its content.
pub fn content_hash(content: &str) -> String {
    sha256_hex(content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_id_is_deterministic() {
        let a = block_id("a.ts", 1, 10, "function_declaration", 0);
        let b = block_id("a.ts", 1, 10, "function_declaration", 0);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn block_id_differs_by_chunk_index() {
        let a = block_id("a.ts", 1, 10, "function_declaration", 0);
        let b = block_id("a.ts", 1, 10, "function_declaration", 1);
        assert_ne!(a, b);
    }

    #[test]
    fn content_hash_matches_known_vector() {
        // SHA-256("") per RFC well-known test vector.
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
