//! Row-level helpers used only inside the one atomic write transaction
//! described in `spec.md §4.5`/`§5`: delete-old-blocks → insert-new-blocks →
//! insert-new-mapping, all against a single `rusqlite::Transaction` so the
//! whole sequence commits or rolls back together.

use rusqlite::{params, Transaction};

use crate::error::Result;
use crate::model::{Block, FileRecord};

/// Deletes every `code_blocks`, `code_fts`, and `vector_map` row for
/// `file_path`, returning the ANN labels that were mapped to the deleted
/// blocks so the caller can tombstone them in the ANN index after commit.
pub fn delete_blocks_for_file(tx: &Transaction, file_path: &str) -> Result<Vec<u64>> {
    let block_ids: Vec<String> = {
        let mut stmt = tx.prepare("SELECT block_id FROM code_blocks WHERE file_path = ?1")?;
        stmt.query_map(params![file_path], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?
    };

    let labels: Vec<u64> = if block_ids.is_empty() {
        Vec::new()
    } else {
        let placeholders = block_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT label FROM vector_map WHERE block_id IN ({placeholders})");
        let mut stmt = tx.prepare(&sql)?;
        let params = rusqlite::params_from_iter(block_ids.iter());
        stmt.query_map(params, |r| r.get::<_, i64>(0).map(|v| v as u64))?
            .collect::<rusqlite::Result<_>>()?
    };

    tx.execute("DELETE FROM code_blocks WHERE file_path = ?1", params![file_path])?;
    tx.execute("DELETE FROM code_fts WHERE file_path = ?1", params![file_path])?;
    if !block_ids.is_empty() {
        let placeholders = block_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("DELETE FROM vector_map WHERE block_id IN ({placeholders})");
        tx.execute(&sql, rusqlite::params_from_iter(block_ids.iter()))?;
    }

    Ok(labels)
}

pub fn insert_block(tx: &Transaction, block: &Block) -> Result<()> {
    tx.execute(
        "INSERT INTO code_blocks (
            block_id, file_path, start_line, end_line, content, content_hash,
            block_type, language, symbol_name, parent_symbol, tokens,
            chunk_index, created_at, updated_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
        params![
            block.block_id,
            block.file_path,
            block.start_line,
            block.end_line,
            block.content,
            block.content_hash,
            block.block_type,
            block.language,
            block.symbol_name,
            block.parent_symbol,
            block.tokens,
            block.chunk_index,
            block.created_at,
            block.updated_at,
        ],
    )?;
    Ok(())
}

pub fn insert_fts_row(tx: &Transaction, block: &Block) -> Result<()> {
    tx.execute(
        "INSERT INTO code_fts (block_id, file_path, content, symbol_name) VALUES (?1, ?2, ?3, ?4)",
        params![
            block.block_id,
            block.file_path,
            block.content,
            block.symbol_name.clone().unwrap_or_default(),
        ],
    )?;
    Ok(())
}

pub fn insert_vector_mapping(tx: &Transaction, label: u64, block_id: &str) -> Result<()> {
    tx.execute(
        "INSERT INTO vector_map (label, block_id) VALUES (?1, ?2)",
        params![label as i64, block_id],
    )?;
    Ok(())
}

pub fn upsert_file_record(tx: &Transaction, record: &FileRecord) -> Result<()> {
    tx.execute(
        "INSERT INTO files (file_path, file_hash, language, size_bytes, line_count, last_indexed, block_count, is_deleted)
         VALUES (?1,?2,?3,?4,?5,?6,?7,0)
         ON CONFLICT(file_path) DO UPDATE SET
            file_hash = excluded.file_hash,
            language = excluded.language,
            size_bytes = excluded.size_bytes,
            line_count = excluded.line_count,
            last_indexed = excluded.last_indexed,
            block_count = excluded.block_count,
            is_deleted = 0",
        params![
            record.file_path,
            record.file_hash,
            record.language,
            record.size_bytes,
            record.line_count,
            record.last_indexed,
            record.block_count,
        ],
    )?;
    Ok(())
}

pub fn mark_file_deleted(tx: &Transaction, file_path: &str) -> Result<()> {
    tx.execute("UPDATE files SET is_deleted = 1 WHERE file_path = ?1", params![file_path])?;
    Ok(())
}
