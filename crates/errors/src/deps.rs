//! Dependency resolution and installation error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum DepsError {
    #[error("dependency resolution failed for {package}: {message}")]
    ResolutionFailed { package: String, message: String },

    #[error("stdlib resolution failed for {package}: {message}")]
    StdlibResolutionFailed { package: String, message: String },

    #[error("artifact {hash} for {package} is not installed in the store")]
    ArtifactUnavailable { package: String, hash: String },
}
