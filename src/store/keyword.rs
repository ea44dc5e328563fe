//! Full-text search with BM25 ranking over block content and symbol name
//! (`spec.md §4.3`), backed by SQLite's FTS5 virtual table `code_fts` with a
//! Porter-stemming Unicode tokenizer and the built-in `bm25()` function.

use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use rusqlite::{params, Connection};
use std::sync::LazyLock;

use crate::error::Result;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

pub struct KeywordStore {
    conn: Arc<Mutex<Connection>>,
}

impl KeywordStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn insert_or_replace(
        &self,
        block_id: &str,
        file_path: &str,
        content: &str,
        symbol_name: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM code_fts WHERE block_id = ?1", params![block_id])?;
        conn.execute(
            "INSERT INTO code_fts (block_id, file_path, content, symbol_name) VALUES (?1, ?2, ?3, ?4)",
            params![block_id, file_path, content, symbol_name.unwrap_or("")],
        )?;
        Ok(())
    }

    /// Removes all rows for the given file. `code_fts` carries `file_path`
    /// directly (an FTS5 UNINDEXED column) so this never needs to join
    /// through BlockCatalog.
    pub fn delete_by_file(&self, file_path: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM code_fts WHERE file_path = ?1", params![file_path])?;
        Ok(())
    }

    /// Sanitizes `raw_query` by dropping non-word/whitespace characters,
    /// splitting on whitespace, dropping empty tokens, then disjoining the
    /// tokens (OR). An empty sanitized query returns an empty list, never
    /// an error — per `spec.md §7`'s QueryMalformed rule.
    pub fn search(&self, raw_query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        let sanitized = NON_WORD.replace_all(raw_query, " ");
        let tokens: Vec<&str> = sanitized.split_whitespace().filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let match_expr = tokens.join(" OR ");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT block_id, bm25(code_fts) AS rank
             FROM code_fts WHERE code_fts MATCH ?1
             ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![match_expr, limit as i64], |row| {
                let block_id: String = row.get(0)?;
                // bm25() in SQLite FTS5 returns a *negative* score where
                // lower (more negative) is more relevant; flip the sign so
                // callers work with "higher is better" like every other
                // channel in this crate.
                let raw_rank: f64 = row.get(1)?;
                Ok((block_id, -raw_rank as f32))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::open_connection;
    use tempfile::tempdir;

    fn fresh_store() -> KeywordStore {
        let dir = tempdir().unwrap();
        let conn = Arc::new(Mutex::new(open_connection(&dir.path().join("cache.db")).unwrap()));
        // Keep the tempdir alive for the test's duration by leaking it —
        // acceptable in a short-lived unit test.
        std::mem::forget(dir);
        KeywordStore::new(conn)
    }

    #[test]
    fn search_finds_inserted_block() {
        let store = fresh_store();
        store
            .insert_or_replace("b1", "a.ts", "export function getUserById(id) {}", Some("getUserById"))
            .unwrap();
        let results = store.search("user by id", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "b1");
    }

    #[test]
    fn empty_sanitized_query_returns_empty_without_error() {
        let store = fresh_store();
        let results = store.search("!!! ??? ###", 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn delete_by_file_removes_rows() {
        let store = fresh_store();
        store.insert_or_replace("b1", "a.ts", "function foo() {}", Some("foo")).unwrap();
        store.delete_by_file("a.ts").unwrap();
        let results = store.search("foo", 10).unwrap();
        assert!(results.is_empty());
    }
}
