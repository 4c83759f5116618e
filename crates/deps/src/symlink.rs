//! Symlink trees: mirror an artifact into the install staging directory
//!
//! Directories are mirrored with `mkdir`, regular files become relative
//! symlinks back into the per-build artifact copy, and symlinks in the
//! artifact are recreated verbatim. The applied diff is recorded so the
//! reverse operation never has to guess.

use crossforge_errors::Error;
use crossforge_hash::Sha256;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// The diff one `symlink_tree` application produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Symlinks created, in creation order
    pub links: Vec<PathBuf>,
    /// Directories created (not pre-existing), in creation order
    pub dirs: Vec<PathBuf>,
}

impl LinkRecord {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.dirs.is_empty()
    }
}

/// Mirror `artifact` into `dest`, appending every created path to
/// `record`.
///
/// Existing identical content is skipped silently; conflicting content is
/// left alone with a warning naming the artifact that owns it.
///
/// # Errors
///
/// Returns an error on filesystem failures; conflicts are never fatal.
pub async fn symlink_tree(
    artifact: &Path,
    dest: &Path,
    record: &mut LinkRecord,
) -> Result<(), Error> {
    let mut entries = fs::read_dir(artifact)
        .await
        .map_err(|e| Error::io_with_path(&e, artifact))?;

    while let Some(entry) = entries.next_entry().await? {
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let meta = fs::symlink_metadata(&from).await?;

        if meta.file_type().is_symlink() {
            // A symlink in the artifact stays the same symlink in the
            // destination.
            let target = fs::read_link(&from).await?;
            if fs::symlink_metadata(&to).await.is_ok() {
                check_conflict(&from, &to).await?;
            } else {
                fs::symlink(&target, &to).await?;
                record.links.push(to);
            }
        } else if meta.is_dir() {
            match fs::symlink_metadata(&to).await {
                Ok(existing) if existing.is_dir() => {}
                Ok(_) => {
                    check_conflict(&from, &to).await?;
                    continue;
                }
                Err(_) => {
                    fs::create_dir(&to).await?;
                    record.dirs.push(to.clone());
                }
            }
            Box::pin(symlink_tree(&from, &to, record)).await?;
        } else if fs::symlink_metadata(&to).await.is_ok() {
            check_conflict(&from, &to).await?;
        } else {
            let relative = relative_path(to.parent().unwrap_or(dest), &from);
            fs::symlink(&relative, &to).await?;
            record.links.push(to);
        }
    }

    Ok(())
}

/// Remove every symlink under `dest` that points into `artifact`.
/// Directories are left for the later audit step. This is the fallback
/// for cleanups that lost their [`LinkRecord`].
///
/// # Errors
///
/// Returns an error only on filesystem traversal failures.
pub async fn unsymlink_tree(artifact: &Path, dest: &Path) -> Result<(), Error> {
    let mut entries = match fs::read_dir(dest).await {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let meta = fs::symlink_metadata(&path).await?;

        if meta.file_type().is_symlink() {
            if let Ok(real) = fs::canonicalize(&path).await {
                if real.starts_with(artifact) {
                    fs::remove_file(&path).await?;
                }
            } else {
                // Dangling links into a removed artifact copy.
                let target = fs::read_link(&path).await?;
                let resolved = path.parent().map_or(target.clone(), |p| p.join(&target));
                if normalise(&resolved).starts_with(artifact) {
                    fs::remove_file(&path).await?;
                }
            }
        } else if meta.is_dir() {
            Box::pin(unsymlink_tree(artifact, &path)).await?;
        }
    }

    Ok(())
}

/// Matching sizes and SHA-256s mean another dependency already provides
/// this file; anything else earns a warning naming the current owner.
async fn check_conflict(from: &Path, to: &Path) -> Result<(), Error> {
    if files_identical(from, to).await {
        return Ok(());
    }
    match owning_artifact(to).await {
        Some(owner) => tracing::warn!(
            path = %to.display(),
            "already provided by artifact {owner}, keeping the existing file"
        ),
        None => tracing::warn!(
            path = %to.display(),
            "already exists with different contents, keeping the existing file"
        ),
    }
    Ok(())
}

async fn files_identical(a: &Path, b: &Path) -> bool {
    let (Ok(meta_a), Ok(meta_b)) = (fs::metadata(a).await, fs::metadata(b).await) else {
        return false;
    };
    if !meta_a.is_file() || !meta_b.is_file() || meta_a.len() != meta_b.len() {
        return false;
    }
    match (Sha256::hash_file(a).await, Sha256::hash_file(b).await) {
        (Ok(ha), Ok(hb)) => ha == hb,
        _ => false,
    }
}

/// Climb the resolved path until the `artifacts/<hash>` component to name
/// the artifact that owns an occupied destination
async fn owning_artifact(path: &Path) -> Option<String> {
    let real = fs::canonicalize(path).await.ok()?;
    let mut current = real.as_path();
    while let Some(parent) = current.parent() {
        if parent.file_name().is_some_and(|n| n == "artifacts") {
            return current.file_name().map(|n| n.to_string_lossy().into_owned());
        }
        current = parent;
    }
    None
}

/// Relative path from directory `from` to `to`; both must be absolute
fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &to[common..] {
        out.push(component);
    }
    out
}

/// Lexical `..`/`.` removal without touching the filesystem
fn normalise(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}
