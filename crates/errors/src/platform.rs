//! Platform and triplet error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum PlatformError {
    #[error("invalid triplet: {input}")]
    InvalidTriplet { input: String },

    #[error("invalid platform key {key}: {message}")]
    InvalidKey { key: String, message: String },

    #[error("unknown microarchitecture {march} for {arch}")]
    UnknownMicroarchitecture { arch: String, march: String },
}
