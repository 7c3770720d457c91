use thiserror::Error;

/// Failure of a persistence store operation.
///
/// Every variant is terminal for the operation that produced it; nothing in
/// the store retries.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open SQLite database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to create database directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("schema migration failed: {0}")]
    Migration(String),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("{field} value {value} is outside the SQLite INTEGER range")]
    OutOfRange { field: &'static str, value: String },

    #[error("invalid {field} timestamp '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("database worker is unavailable: {0}")]
    WorkerGone(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
