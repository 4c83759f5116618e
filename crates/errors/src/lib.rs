#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the crossforge sandbox orchestrator
//!
//! This crate provides fine-grained error types organized by domain.
//! All error types implement Clone where possible for easier handling.

pub mod deps;
pub mod mount;
pub mod package;
pub mod platform;
pub mod shard;
pub mod source;
pub mod storage;

// Re-export all error types at the root
pub use deps::DepsError;
pub use mount::MountError;
pub use package::PackageError;
pub use platform::PlatformError;
pub use shard::ShardError;
pub use source::SourceError;
pub use storage::StorageError;

use thiserror::Error;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("shard error: {0}")]
    Shard(#[from] ShardError),

    #[error("mount error: {0}")]
    Mount(#[from] MountError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("dependency error: {0}")]
    Deps(#[from] DepsError),

    #[error("package error: {0}")]
    Package(#[from] PackageError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
        path: Option<std::path::PathBuf>,
    },
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}
