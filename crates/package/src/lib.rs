#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Packaging: snapshot an install prefix into a content-addressed tarball
//!
//! The snapshot goes through the artifact store first, yielding the git
//! tree hash that identifies the build's output; the tarball is then
//! emitted deterministically so identical prefixes produce identical
//! archives.

mod archive;

use crossforge_errors::{Error, PackageError};
use crossforge_hash::{Sha256, TreeHash};
use crossforge_platform::Platform;
use crossforge_store::ArtifactStore;
use semver::Version;
use std::path::{Path, PathBuf};
use tokio::fs;

/// The three identifiers of a packaged build
#[derive(Debug, Clone)]
pub struct PackageResult {
    pub path: PathBuf,
    pub sha256: Sha256,
    pub tree_hash: TreeHash,
}

/// Compression codecs `compress_dir` understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Gzip,
}

impl Codec {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Gzip => "gz",
        }
    }
}

/// Package `dir` (typically a build's install staging tree) as
/// `<out_base>.v<version>.<triplet>.tar.gz`.
///
/// # Errors
///
/// Returns [`PackageError::OutputExists`] when the output file exists and
/// `force` is unset, and archive errors otherwise.
pub async fn package(
    store: &ArtifactStore,
    dir: &Path,
    out_base: &Path,
    version: &Version,
    platform: &Platform,
    force: bool,
) -> Result<PackageResult, Error> {
    let out_path = tarball_path(out_base, version, platform);

    if fs::metadata(&out_path).await.is_ok() {
        if !force {
            return Err(PackageError::OutputExists {
                path: out_path.display().to_string(),
            }
            .into());
        }
        fs::remove_file(&out_path).await?;
    }

    // Snapshot through the store: this both content-addresses the output
    // and guarantees we archive an immutable tree.
    let tree_hash = store.install_from_dir(dir).await?;
    let snapshot = store.artifact_path(&tree_hash);

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    archive::create_tarball(&snapshot, &out_path).await?;

    let sha256 = Sha256::hash_file(&out_path).await?;
    Ok(PackageResult {
        path: out_path,
        sha256,
        tree_hash,
    })
}

/// `<out_base>.v<version>.<triplet>.tar.gz`
#[must_use]
pub fn tarball_path(out_base: &Path, version: &Version, platform: &Platform) -> PathBuf {
    let base = out_base.as_os_str().to_string_lossy();
    PathBuf::from(format!("{base}.v{version}.{}.tar.gz", platform.triplet()))
}

/// Compress every regular file in `dir` in place, appending the codec's
/// extension and deleting the originals. Symlinks and subdirectories are
/// skipped.
///
/// # Errors
///
/// Returns an error on read or write failures.
pub async fn compress_dir(dir: &Path, codec: Codec, level: u32, ext: &str) -> Result<(), Error> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| Error::io_with_path(&e, dir))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let meta = fs::symlink_metadata(&path).await?;
        if !meta.is_file() {
            continue;
        }

        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(ext);
        let compressed = PathBuf::from(name);

        match codec {
            Codec::Gzip => archive::gzip_file(&path, &compressed, level).await?,
        }
        fs::remove_file(&path).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossforge_platform::{Arch, Libc, TargetPlatform};

    #[test]
    fn tarball_path_encodes_version_and_triplet() {
        let platform = Platform::Target(TargetPlatform::linux(Arch::X86_64, Libc::Musl));
        assert_eq!(
            tarball_path(Path::new("/out/Zlib"), &Version::new(1, 2, 13), &platform),
            PathBuf::from("/out/Zlib.v1.2.13.x86_64-linux-musl.tar.gz")
        );

        assert_eq!(
            tarball_path(Path::new("Any"), &Version::new(0, 1, 0), &Platform::Any),
            PathBuf::from("Any.v0.1.0.any.tar.gz")
        );
    }
}
