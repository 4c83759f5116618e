//! Artifact store error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("path not found: {path}")]
    PathNotFound { path: String },

    #[error("corrupted data: {message}")]
    CorruptedData { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}
