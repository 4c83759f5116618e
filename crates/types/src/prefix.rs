//! Build prefix: the per-build workspace layout
//!
//! ```text
//! P/srcdir/                        sources, possibly patches/
//! P/metadir/                       build metadata
//! P/<target-triplet>/destdir/      install staging (real)
//! P/<host-triplet>/destdir/        host tool staging
//! P/destdir -> <target-triplet>/destdir
//! P/<triplet>/artifacts/<hash>/    per-build copy of each dependency
//! P/<triplet>/.project/            private package environment
//! P/.mounts/<shard-name>/          squashfs mountpoints
//! ```
//!
//! The prefix is owned exclusively by one build and lives exactly as long
//! as it.

use crossforge_errors::Error;
use crossforge_hash::TreeHash;
use crossforge_platform::TargetPlatform;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const SRCDIR: &str = "srcdir";
pub const METADIR: &str = "metadir";
pub const DESTDIR: &str = "destdir";
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const PROJECT_DIR: &str = ".project";
pub const MOUNTS_DIR: &str = ".mounts";
pub const PATCHES_DIR: &str = "patches";

/// Canonicalised absolute root of one build's workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    root: PathBuf,
}

impl Prefix {
    /// Wrap an existing, already-canonical prefix root
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the on-disk layout for a build targeting `target`, with host
    /// tools staged for `host`, and return the canonicalised prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if directories or the `destdir` symlink cannot be
    /// created.
    pub async fn create(
        root: &Path,
        target: &TargetPlatform,
        host: &TargetPlatform,
    ) -> Result<Self, Error> {
        fs::create_dir_all(root)
            .await
            .map_err(|e| Error::io_with_path(&e, root))?;
        let root = fs::canonicalize(root)
            .await
            .map_err(|e| Error::io_with_path(&e, root))?;
        let prefix = Self { root };

        fs::create_dir_all(prefix.srcdir()).await?;
        fs::create_dir_all(prefix.metadir()).await?;
        fs::create_dir_all(prefix.destdir(target)).await?;
        if host != target {
            fs::create_dir_all(prefix.destdir(host)).await?;
        }

        // Stable entry point for build scripts regardless of the target.
        let link = prefix.root.join(DESTDIR);
        let link_target = Path::new(&target.triplet()).join(DESTDIR);
        match fs::symlink_metadata(&link).await {
            Ok(_) => {}
            Err(_) => {
                #[cfg(unix)]
                fs::symlink(&link_target, &link).await?;
                #[cfg(not(unix))]
                fs::create_dir_all(&link).await?;
            }
        }

        Ok(prefix)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn srcdir(&self) -> PathBuf {
        self.root.join(SRCDIR)
    }

    #[must_use]
    pub fn patches_dir(&self) -> PathBuf {
        self.srcdir().join(PATCHES_DIR)
    }

    #[must_use]
    pub fn metadir(&self) -> PathBuf {
        self.root.join(METADIR)
    }

    #[must_use]
    pub fn destdir(&self, platform: &TargetPlatform) -> PathBuf {
        self.root.join(platform.triplet()).join(DESTDIR)
    }

    /// Per-build copy location for one dependency artifact
    #[must_use]
    pub fn artifact_dir(&self, platform: &TargetPlatform, hash: &TreeHash) -> PathBuf {
        self.artifacts_dir(platform).join(hash.to_hex())
    }

    #[must_use]
    pub fn artifacts_dir(&self, platform: &TargetPlatform) -> PathBuf {
        self.root.join(platform.triplet()).join(ARTIFACTS_DIR)
    }

    /// Private package environment for dependency resolution
    #[must_use]
    pub fn project_dir(&self, platform: &TargetPlatform) -> PathBuf {
        self.root.join(platform.triplet()).join(PROJECT_DIR)
    }

    #[must_use]
    pub fn mounts_dir(&self) -> PathBuf {
        self.root.join(MOUNTS_DIR)
    }
}
