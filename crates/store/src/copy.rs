//! Recursive directory copies that preserve symlinks and mode bits
//!
//! Dependency artifacts are *copied* per build rather than linked, so a
//! misbehaving build script can at worst damage its own copy, never the
//! global store.

use crossforge_errors::Error;
use std::path::Path;
use tokio::fs;

/// Copy `source` to `dest` recursively. Symlinks are recreated verbatim,
/// file modes are carried by `fs::copy`, and the destination root inherits
/// the source directory's permissions.
///
/// # Errors
///
/// Returns an error if the source cannot be read or the destination cannot
/// be written. A failure to adjust permissions is demoted to a debug log.
pub async fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<(), Error> {
    fs::create_dir_all(dest)
        .await
        .map_err(|e| Error::io_with_path(&e, dest))?;
    copy_permissions(source, dest).await;

    let mut entries = fs::read_dir(source)
        .await
        .map_err(|e| Error::io_with_path(&e, source))?;

    while let Some(entry) = entries.next_entry().await? {
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let meta = fs::symlink_metadata(&from).await?;

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&from).await?;
            #[cfg(unix)]
            fs::symlink(&target, &to).await?;
            #[cfg(not(unix))]
            return Err(Error::internal("symlink copy requires unix"));
        } else if meta.is_dir() {
            Box::pin(copy_dir_recursive(&from, &to)).await?;
        } else {
            fs::copy(&from, &to)
                .await
                .map_err(|e| Error::io_with_path(&e, &from))?;
        }
    }

    Ok(())
}

async fn copy_permissions(source: &Path, dest: &Path) {
    let Ok(meta) = fs::metadata(source).await else {
        return;
    };
    if let Err(err) = fs::set_permissions(dest, meta.permissions()).await {
        tracing::debug!(path = %dest.display(), "could not copy permissions: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copy_preserves_symlinks_and_modes() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("lib")).await.unwrap();
        fs::write(src.join("lib/libz.so.1.2"), b"elf").await.unwrap();
        fs::symlink("libz.so.1.2", src.join("lib/libz.so")).await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(src.join("lib/libz.so.1.2"), std::fs::Permissions::from_mode(0o755))
                .await
                .unwrap();
        }

        let dst = tmp.path().join("dst");
        copy_dir_recursive(&src, &dst).await.unwrap();

        let link = fs::read_link(dst.join("lib/libz.so")).await.unwrap();
        assert_eq!(link, std::path::PathBuf::from("libz.so.1.2"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dst.join("lib/libz.so.1.2"))
                .await
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }
}
