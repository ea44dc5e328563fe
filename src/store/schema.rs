//! `cache.db` schema: `code_blocks`, `files`, `search_stats`, `metadata`,
//! `vector_map`, and the `code_fts` full-text virtual table, per
//! `spec.md §6`.

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn open_connection(path: &std::path::Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    migrate(&conn)?;
    Ok(conn)
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS files (
            file_path TEXT PRIMARY KEY,
            file_hash TEXT NOT NULL,
            language TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            line_count INTEGER NOT NULL,
            last_indexed INTEGER NOT NULL,
            block_count INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS code_blocks (
            block_id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            block_type TEXT NOT NULL,
            language TEXT NOT NULL,
            symbol_name TEXT,
            parent_symbol TEXT,
            tokens INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_code_blocks_file_path ON code_blocks(file_path);

        CREATE TABLE IF NOT EXISTS vector_map (
            label INTEGER PRIMARY KEY,
            block_id TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS search_stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query_hash TEXT NOT NULL,
            query TEXT NOT NULL,
            result_count INTEGER NOT NULL,
            avg_score REAL NOT NULL,
            execution_time_ms INTEGER NOT NULL,
            timestamp INTEGER NOT NULL
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS code_fts USING fts5(
            block_id UNINDEXED,
            file_path UNINDEXED,
            content,
            symbol_name,
            tokenize = 'porter unicode61'
        );
        ",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}
