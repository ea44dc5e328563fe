use thiserror::Error;

/// Error taxonomy for the index/search pipeline.
///
/// Variants map onto propagation rules: `TransientIo` and `ParseFailure` are
/// meant to be caught per-file by the Ingestor and logged, never bubbled up
/// as a fatal error; `StoreCorruption` and `EmbedderUnavailable` are meant to
/// abort startup.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transient I/O error reading {path}: {source}")]
    TransientIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    #[error("failed to parse {path}: {reason}")]
    ParseFailure { path: String, reason: String },

    #[error("on-disk store is corrupt or from an incompatible schema: {0}")]
    StoreCorruption(String),

    #[error("ANN capacity exhausted and could not grow: {0}")]
    CapacityExhausted(String),

    #[error("query malformed: {0}")]
    QueryMalformed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
