//! Git tree hashing of artifact directories
//!
//! Artifacts are identified by the same object hash `git` would assign to
//! the directory, so tree hashes computed here interoperate with manifests
//! produced by git tooling. Empty subdirectories are unrepresentable in the
//! tree format and are skipped, exactly as git does.

use crate::TreeHash;
use crossforge_errors::{Error, StorageError};
use sha1::{Digest, Sha1};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Tree hash of the empty directory (`git hash-object -t tree /dev/null`)
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

const FILE_CHUNK: usize = 64 * 1024;

/// Compute the git-tree-sha1 of a directory's contents
///
/// # Errors
///
/// Returns an error if the directory cannot be traversed or a file cannot
/// be read.
pub async fn tree_hash_of_dir(dir: &Path) -> Result<TreeHash, Error> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || hash_tree(&dir))
        .await
        .map_err(|e| Error::internal(format!("tree hash task failed: {e}")))?
        .map(|hash| hash.unwrap_or_else(|| TreeHash::from_hex(EMPTY_TREE).unwrap()))
}

/// Hash one directory level; `None` marks an empty tree, which the parent
/// omits from its own object.
fn hash_tree(dir: &Path) -> Result<Option<TreeHash>, Error> {
    let mut entries = Vec::new();

    for entry in std::fs::read_dir(dir).map_err(|e| Error::io_with_path(&e, dir))? {
        let entry = entry?;
        let meta = std::fs::symlink_metadata(entry.path())?;
        entries.push((entry.file_name(), entry.path(), meta));
    }

    // Git orders tree entries by name bytes, with directories compared as
    // if their name ended in '/'.
    entries.sort_by(|a, b| {
        let key = |(name, _, meta): &(std::ffi::OsString, PathBuf, std::fs::Metadata)| {
            let mut k = name.as_encoded_bytes().to_vec();
            if meta.is_dir() {
                k.push(b'/');
            }
            k
        };
        key(a).cmp(&key(b))
    });

    let mut body = Vec::new();
    for (name, path, meta) in entries {
        let (mode, hash) = if meta.is_symlink() {
            let target = std::fs::read_link(&path)?;
            ("120000", hash_blob_bytes(target.as_os_str().as_encoded_bytes()))
        } else if meta.is_dir() {
            match hash_tree(&path)? {
                Some(subtree) => ("40000", subtree),
                None => continue,
            }
        } else {
            let mode = if is_executable(&meta) { "100755" } else { "100644" };
            (mode, hash_blob_file(&path, meta.len())?)
        };

        body.extend_from_slice(mode.as_bytes());
        body.push(b' ');
        body.extend_from_slice(name.as_encoded_bytes());
        body.push(0);
        body.extend_from_slice(hash.as_bytes());
    }

    if body.is_empty() {
        return Ok(None);
    }

    let mut hasher = Sha1::new();
    hasher.update(format!("tree {}\0", body.len()).as_bytes());
    hasher.update(&body);
    Ok(Some(TreeHash::from_bytes(hasher.finalize().into())))
}

fn hash_blob_bytes(data: &[u8]) -> TreeHash {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", data.len()).as_bytes());
    hasher.update(data);
    TreeHash::from_bytes(hasher.finalize().into())
}

fn hash_blob_file(path: &Path, len: u64) -> Result<TreeHash, Error> {
    let mut file = std::fs::File::open(path).map_err(|_| StorageError::PathNotFound {
        path: path.display().to_string(),
    })?;

    let mut hasher = Sha1::new();
    hasher.update(format!("blob {len}\0").as_bytes());

    let mut buffer = vec![0; FILE_CHUNK];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(TreeHash::from_bytes(hasher.finalize().into()))
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_dir_hashes_to_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let hash = tree_hash_of_dir(dir.path()).await.unwrap();
        assert_eq!(hash.to_hex(), EMPTY_TREE);
    }

    #[tokio::test]
    async fn known_git_tree_hash() {
        // git mktree over a single entry:
        //   100644 blob e965047ad7c57865823c7d992b1d046ea66edf78  hello
        // where the blob is "Hello\n".
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("hello"), "Hello\n")
            .await
            .unwrap();

        let hash = tree_hash_of_dir(dir.path()).await.unwrap();
        assert_eq!(hash.to_hex(), "90fa7e05d3e0a8c71be3b43fd1cae61d1b8f6e0a");
    }

    #[tokio::test]
    async fn tree_hash_is_stable_and_content_sensitive() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        for dir in [&a, &b] {
            tokio::fs::create_dir(dir.path().join("lib")).await.unwrap();
            tokio::fs::write(dir.path().join("lib/x.so"), b"payload")
                .await
                .unwrap();
        }

        let ha = tree_hash_of_dir(a.path()).await.unwrap();
        let hb = tree_hash_of_dir(b.path()).await.unwrap();
        assert_eq!(ha, hb);

        tokio::fs::write(b.path().join("lib/x.so"), b"different")
            .await
            .unwrap();
        let hb2 = tree_hash_of_dir(b.path()).await.unwrap();
        assert_ne!(ha, hb2);
    }

    #[tokio::test]
    async fn empty_subdirectories_are_ignored() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        tokio::fs::write(a.path().join("f"), b"x").await.unwrap();
        tokio::fs::write(b.path().join("f"), b"x").await.unwrap();
        tokio::fs::create_dir(b.path().join("empty")).await.unwrap();

        assert_eq!(
            tree_hash_of_dir(a.path()).await.unwrap(),
            tree_hash_of_dir(b.path()).await.unwrap()
        );
    }
}
