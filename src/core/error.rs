use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Field encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invariant violation: {0}")]
    Invariant(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
