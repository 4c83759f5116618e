#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Content-addressed artifact store
//!
//! Artifacts are directories named by their git-tree-sha1, shared
//! read-only across builds. Installation is atomic at the directory level
//! (stage to a temporary sibling, rename into place) and tolerant of
//! concurrent producers racing to install the same tree.

mod copy;

pub use copy::copy_dir_recursive;

use crossforge_errors::{Error, StorageError};
use crossforge_hash::{tree_hash_of_dir, TreeHash};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Handle to the global artifact store
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage path of an artifact tree (whether or not it is installed)
    #[must_use]
    pub fn artifact_path(&self, hash: &TreeHash) -> PathBuf {
        self.root.join(hash.to_hex())
    }

    /// Whether the artifact is installed
    pub async fn contains(&self, hash: &TreeHash) -> bool {
        fs::metadata(self.artifact_path(hash)).await.is_ok()
    }

    /// Resolve an installed artifact's path
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PathNotFound`] if the artifact is not
    /// installed.
    pub async fn resolve(&self, hash: &TreeHash) -> Result<PathBuf, Error> {
        let path = self.artifact_path(hash);
        if fs::metadata(&path).await.is_err() {
            return Err(StorageError::PathNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        Ok(path)
    }

    /// Install a directory as a content-addressed artifact and return its
    /// tree hash. Re-installing an existing tree is a no-op; two processes
    /// racing to install the same tree both succeed.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing or the staging copy fails.
    pub async fn install_from_dir(&self, source: &Path) -> Result<TreeHash, Error> {
        let hash = tree_hash_of_dir(source).await?;
        let dest = self.artifact_path(&hash);

        if fs::metadata(&dest).await.is_ok() {
            return Ok(hash);
        }

        fs::create_dir_all(&self.root).await?;
        let staging = self.root.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        copy_dir_recursive(source, &staging).await?;

        match fs::rename(&staging, &dest).await {
            Ok(()) => {}
            Err(err) => {
                // A concurrent producer won the race; their tree is ours.
                let _ = fs::remove_dir_all(&staging).await;
                if fs::metadata(&dest).await.is_err() {
                    return Err(StorageError::IoError {
                        message: format!(
                            "failed to finalise artifact {}: {err}",
                            hash.to_hex()
                        ),
                    }
                    .into());
                }
                tracing::debug!(hash = %hash, "artifact installed concurrently");
            }
        }

        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_is_idempotent_and_content_addressed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("store"));

        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("bin")).await.unwrap();
        fs::write(src.join("bin/tool"), b"#!/bin/sh\n").await.unwrap();

        let first = store.install_from_dir(&src).await.unwrap();
        let second = store.install_from_dir(&src).await.unwrap();
        assert_eq!(first, second);
        assert!(store.contains(&first).await);
        assert!(store
            .artifact_path(&first)
            .join("bin/tool")
            .exists());
    }
}
