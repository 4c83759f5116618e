//! Packaging error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum PackageError {
    #[error("output already exists: {path} (pass force to overwrite)")]
    OutputExists { path: String },

    #[error("archive creation failed: {message}")]
    ArchiveFailed { message: String },
}
