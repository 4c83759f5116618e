//! Compiler shard catalog and selection error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ShardError {
    #[error("shard not registered in catalog: {name}")]
    Unregistered { name: String },

    #[error("shard artifact {hash} for {name} is not installed")]
    ArtifactMissing { name: String, hash: String },

    #[error("no toolchain satisfies the requested ABI for {triplet}: {message}")]
    ImpossibleAbi { triplet: String, message: String },

    #[error("shard manifest {path} unreadable: {message}")]
    ManifestError { path: String, message: String },
}
