//! The authoritative `code_blocks` / `files` tables, keyed by `block_id`.
//! VectorStore and KeywordStore only ever hold references into this catalog
//! — they must be joined through it, never trusted on their own.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::model::{Block, FileRecord, SearchStat};

pub struct BlockCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl BlockCatalog {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn blocks_for_file(&self, file_path: &str) -> Result<Vec<Block>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT block_id, file_path, start_line, end_line, content, content_hash,
                    block_type, language, symbol_name, parent_symbol, tokens,
                    chunk_index, created_at, updated_at
             FROM code_blocks WHERE file_path = ?1 ORDER BY start_line, chunk_index",
        )?;
        let rows = stmt
            .query_map(params![file_path], row_to_block)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_block(&self, block_id: &str) -> Result<Option<Block>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT block_id, file_path, start_line, end_line, content, content_hash,
                    block_type, language, symbol_name, parent_symbol, tokens,
                    chunk_index, created_at, updated_at
             FROM code_blocks WHERE block_id = ?1",
            params![block_id],
            row_to_block,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn file_record(&self, file_path: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT file_path, file_hash, language, size_bytes, line_count,
                    last_indexed, block_count, is_deleted
             FROM files WHERE file_path = ?1",
            params![file_path],
            row_to_file_record,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn record_search_stat(&self, stat: &SearchStat) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO search_stats (query_hash, query, result_count, avg_score, execution_time_ms, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                stat.query_hash,
                stat.query,
                stat.result_count,
                stat.avg_score,
                stat.execution_time_ms,
                stat.timestamp,
            ],
        )?;
        Ok(())
    }

    /// Total block count across the catalog, used for `status` reporting
    /// and the HybridRetriever's language-distribution boost.
    pub fn total_blocks(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM code_blocks", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    pub fn total_files(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM files WHERE is_deleted = 0", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    /// `language -> block_count` distribution, used for the
    /// language-distribution boost (`spec.md §4.6`).
    pub fn language_distribution(&self) -> Result<Vec<(String, u64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT language, COUNT(*) FROM code_blocks GROUP BY language")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// The `limit` most recently indexed file paths, used by the
    /// HybridRetriever's recency boost (`spec.md §4.6`).
    pub fn recent_files(&self, limit: usize) -> Result<std::collections::HashSet<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT file_path FROM files WHERE is_deleted = 0
             ORDER BY last_indexed DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<std::collections::HashSet<_>>>()?;
        Ok(rows)
    }

    /// Recovers `next_label = max(label) + 1` on open (`spec.md §9`).
    pub fn max_vector_label(&self) -> Result<Option<u64>> {
        let conn = self.conn.lock();
        let max: Option<i64> =
            conn.query_row("SELECT MAX(label) FROM vector_map", [], |r| r.get(0))?;
        Ok(max.map(|v| v as u64))
    }

    pub fn block_ids_for_labels(&self, labels: &[u64]) -> Result<Vec<(u64, String)>> {
        if labels.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders = labels.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT label, block_id FROM vector_map WHERE label IN ({placeholders})");
        let mut stmt = conn.prepare(&sql)?;
        let params = rusqlite::params_from_iter(labels.iter().map(|l| *l as i64));
        let rows = stmt
            .query_map(params, |r| Ok((r.get::<_, i64>(0)? as u64, r.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

pub(crate) fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<Block> {
    Ok(Block {
        block_id: row.get(0)?,
        file_path: row.get(1)?,
        start_line: row.get::<_, i64>(2)? as u32,
        end_line: row.get::<_, i64>(3)? as u32,
        content: row.get(4)?,
        content_hash: row.get(5)?,
        block_type: row.get(6)?,
        language: row.get(7)?,
        symbol_name: row.get(8)?,
        parent_symbol: row.get(9)?,
        tokens: row.get::<_, i64>(10)? as u32,
        chunk_index: row.get::<_, i64>(11)? as u32,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn row_to_file_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        file_path: row.get(0)?,
        file_hash: row.get(1)?,
        language: row.get(2)?,
        size_bytes: row.get::<_, i64>(3)? as u64,
        line_count: row.get::<_, i64>(4)? as u32,
        last_indexed: row.get(5)?,
        block_count: row.get::<_, i64>(6)? as u32,
        is_deleted: row.get::<_, i64>(7)? != 0,
    })
}
