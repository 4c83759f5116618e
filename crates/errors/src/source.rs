//! Source staging error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum SourceError {
    #[error("unknown archive format: {path}")]
    ArchiveFormatUnknown { path: String },

    #[error("hash mismatch for {file}: expected {expected}, got {actual}")]
    HashMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("extraction failed: {message}")]
    ExtractionFailed { message: String },

    #[error("source missing: {path}")]
    Missing { path: String },

    #[error("git operation failed for {repo}: {message}")]
    GitFailed { repo: String, message: String },
}
