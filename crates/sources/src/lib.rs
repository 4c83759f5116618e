#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Source staging: populate a build prefix's `srcdir`
//!
//! Sources are a closed sum; each variant owns its own staging behavior.
//! Archives and files are verified against a pinned SHA-256 before they
//! touch the workspace.

mod extract;

pub use extract::ArchiveFormat;

use crossforge_errors::{Error, SourceError};
use crossforge_hash::Sha256;
use crossforge_types::Prefix;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// One source input for a build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    /// Content-verified archive, extracted into `srcdir`
    Archive { path: PathBuf, sha256: Sha256 },
    /// Content-verified single file, copied into `srcdir`
    File { path: PathBuf, sha256: Sha256 },
    /// Local directory whose contents are copied into `srcdir`
    Directory {
        path: PathBuf,
        follow_symlinks: bool,
    },
    /// Git checkout pinned to a commit
    Git { path: PathBuf, commit: String },
    /// Patch text materialised under `srcdir/patches/`
    Patch { name: String, payload: String },
}

/// Where one source landed in the workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSource {
    pub target: String,
    pub path: PathBuf,
}

impl Source {
    /// Directory or file name this source stages as, relative to `srcdir`
    #[must_use]
    pub fn target_name(&self) -> String {
        match self {
            Self::Archive { path, .. } => {
                let name = file_name(path);
                ArchiveFormat::detect(&name)
                    .map_or(name.clone(), |format| format.strip_suffix(&name))
            }
            Self::File { path, .. } | Self::Directory { path, .. } => file_name(path),
            Self::Git { path, .. } => {
                let name = file_name(path);
                name.strip_suffix(".git").unwrap_or(&name).to_string()
            }
            Self::Patch { name, .. } => {
                format!("{}/{name}", crossforge_types::prefix::PATCHES_DIR)
            }
        }
    }

    /// Stage this source into the prefix's `srcdir`
    ///
    /// # Errors
    ///
    /// Returns an error on hash mismatches, unknown archive formats, or
    /// staging I/O failures.
    pub async fn stage(&self, prefix: &Prefix) -> Result<StagedSource, Error> {
        let target = self.target_name();
        let dest = prefix.srcdir().join(&target);

        match self {
            Self::Archive { path, sha256 } => {
                verify(path, sha256).await?;
                let format = ArchiveFormat::detect(&file_name(path)).ok_or_else(|| {
                    SourceError::ArchiveFormatUnknown {
                        path: path.display().to_string(),
                    }
                })?;
                fs::create_dir_all(&dest).await?;
                extract::extract(format, path, &dest).await?;
            }
            Self::File { path, sha256 } => {
                verify(path, sha256).await?;
                fs::copy(path, &dest)
                    .await
                    .map_err(|e| Error::io_with_path(&e, path))?;
            }
            Self::Directory {
                path,
                follow_symlinks,
            } => {
                if fs::metadata(path).await.is_err() {
                    return Err(SourceError::Missing {
                        path: path.display().to_string(),
                    }
                    .into());
                }
                if *follow_symlinks {
                    copy_dir_following(path, &dest).await?;
                } else {
                    crossforge_store::copy_dir_recursive(path, &dest).await?;
                }
            }
            Self::Git { path, commit } => {
                let repo = path.display().to_string();
                let checkout = dest.display().to_string();
                git(&["clone", &repo, &checkout], path).await?;
                git(&["-C", &checkout, "checkout", "--detach", commit], path).await?;
            }
            Self::Patch { payload, .. } => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::write(&dest, payload).await?;
            }
        }

        tracing::debug!(target, "staged source");
        Ok(StagedSource { target, path: dest })
    }
}

/// Stage every source in order, returning where each one landed
///
/// # Errors
///
/// Fails on the first source that cannot be staged.
pub async fn stage_all(sources: &[Source], prefix: &Prefix) -> Result<Vec<StagedSource>, Error> {
    let mut staged = Vec::with_capacity(sources.len());
    for source in sources {
        staged.push(source.stage(prefix).await?);
    }
    Ok(staged)
}

async fn verify(path: &Path, expected: &Sha256) -> Result<(), Error> {
    let actual = Sha256::hash_file(path).await?;
    if actual != *expected {
        return Err(SourceError::HashMismatch {
            file: path.display().to_string(),
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        }
        .into());
    }
    Ok(())
}

async fn git(args: &[&str], repo: &Path) -> Result<(), Error> {
    let output = tokio::process::Command::new("git")
        .args(args)
        .output()
        .await
        .map_err(|e| Error::io_with_path(&e, repo))?;
    if !output.status.success() {
        return Err(SourceError::GitFailed {
            repo: repo.display().to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Copy resolving symlinks as we go (directory sources opt into this)
async fn copy_dir_following(source: &Path, dest: &Path) -> Result<(), Error> {
    fs::create_dir_all(dest).await?;
    let mut entries = fs::read_dir(source)
        .await
        .map_err(|e| Error::io_with_path(&e, source))?;

    while let Some(entry) = entries.next_entry().await? {
        let from = entry.path();
        let to = dest.join(entry.file_name());
        // metadata() follows symlinks, so links are staged as their
        // resolved contents.
        let meta = fs::metadata(&from)
            .await
            .map_err(|e| Error::io_with_path(&e, &from))?;
        if meta.is_dir() {
            Box::pin(copy_dir_following(&from, &to)).await?;
        } else {
            fs::copy(&from, &to)
                .await
                .map_err(|e| Error::io_with_path(&e, &from))?;
        }
    }
    Ok(())
}
