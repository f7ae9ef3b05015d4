//! Process-level errors
//!
//! Request failures never show up here: they are answered on the wire.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for worker operations
pub type Result<T> = std::result::Result<T, WorkerError>;
