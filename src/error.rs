use std::path::PathBuf;
use thiserror::Error;

/// Custom Result type for this crate.
pub type Result<T> = std::result::Result<T, WikiliteError>;

/// Enum representing all possible errors in the wikilite_rs library.
#[derive(Error, Debug)]
pub enum WikiliteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Cache directory not found or could not be determined")]
    DataDirNotFound,

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Store already exists: {0:?} (use force to overwrite)")]
    StoreExists(PathBuf),

    #[error("{0:?} is a database that was not created by wikilite; refusing to replace it")]
    ForeignDatabase(PathBuf),

    #[error("Store at {0:?} is missing or incomplete")]
    StoreIncomplete(PathBuf),

    #[error("Importer already finalized")]
    ImportFinalized,

    #[error("Import cancelled")]
    Cancelled,

    #[error("Word not found: {0}")]
    WordNotFound(i64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String), // For unexpected situations
}
