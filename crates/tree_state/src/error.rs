//! Persistence error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Tree not found: {0}")]
    NotFound(String),

    #[error("Tree already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid tree data: {0}")]
    InvalidData(String),

    #[error("Saver task has stopped")]
    SaverClosed,
}

pub type Result<T> = std::result::Result<T, StorageError>;
