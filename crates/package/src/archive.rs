//! Deterministic tar.gz emission
//!
//! Identical input trees must produce byte-identical archives: entries
//! are added in sorted order, timestamps are pinned to the epoch, and
//! ownership is normalised to root. Symlinks are preserved as links.

use crossforge_errors::{Error, PackageError};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};

const DETERMINISTIC_TIMESTAMP: u64 = 0;

/// Archive `source_dir` into a gzip-9 tarball at `out_path`
pub(crate) async fn create_tarball(source_dir: &Path, out_path: &Path) -> Result<(), Error> {
    let tar_path = out_path.with_extension("tar.tmp");
    create_deterministic_tar(source_dir, &tar_path).await?;

    let result = gzip_file(&tar_path, out_path, 9).await;
    let _ = tokio::fs::remove_file(&tar_path).await;
    result
}

/// Gzip a single file at the given compression level
pub(crate) async fn gzip_file(source: &Path, dest: &Path, level: u32) -> Result<(), Error> {
    use async_compression::tokio::write::GzipEncoder;
    use async_compression::Level;

    let input = File::open(source)
        .await
        .map_err(|e| Error::io_with_path(&e, source))?;
    let output = File::create(dest)
        .await
        .map_err(|e| Error::io_with_path(&e, dest))?;

    #[allow(clippy::cast_possible_wrap)]
    let mut encoder = GzipEncoder::with_quality(BufWriter::new(output), Level::Precise(level as i32));
    let mut reader = BufReader::new(input);
    tokio::io::copy_buf(&mut reader, &mut encoder).await?;
    encoder.shutdown().await?;
    Ok(())
}

async fn create_deterministic_tar(source_dir: &Path, tar_path: &Path) -> Result<(), Error> {
    let file = File::create(tar_path)
        .await
        .map_err(|e| Error::io_with_path(&e, tar_path))?;
    let file = file.into_std().await;
    let source_dir = source_dir.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<(), Error> {
        let mut builder = tar::Builder::new(file);
        builder.follow_symlinks(false);
        add_directory_to_tar(&mut builder, &source_dir, Path::new(""))?;
        builder.finish()?;
        Ok(())
    })
    .await
    .map_err(|e| {
        Error::from(PackageError::ArchiveFailed {
            message: format!("tar creation task failed: {e}"),
        })
    })??;

    Ok(())
}

fn add_directory_to_tar(
    builder: &mut tar::Builder<std::fs::File>,
    dir_path: &Path,
    tar_path: &Path,
) -> Result<(), Error> {
    let mut entries = std::fs::read_dir(dir_path)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    for entry in entries {
        let path = entry.path();
        let entry_tar_path = tar_path.join(entry.file_name());
        let meta = std::fs::symlink_metadata(&path)?;

        let mut header = tar::Header::new_gnu();
        header.set_mtime(DETERMINISTIC_TIMESTAMP);
        header.set_uid(0);
        header.set_gid(0);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            header.set_mode(meta.permissions().mode() & 0o7777);
        }

        if meta.file_type().is_symlink() {
            let target = std::fs::read_link(&path)?;
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            builder
                .append_link(&mut header, &entry_tar_path, &target)
                .map_err(|e| archive_failed(&path, &e))?;
        } else if meta.is_dir() {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            // Trailing slash marks directory entries in the archive.
            let mut dir_name = entry_tar_path.as_os_str().to_os_string();
            dir_name.push("/");
            builder
                .append_data(&mut header, Path::new(&dir_name), std::io::empty())
                .map_err(|e| archive_failed(&path, &e))?;
            add_directory_to_tar(builder, &path, &entry_tar_path)?;
        } else {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(meta.len());
            let file = std::fs::File::open(&path)?;
            builder
                .append_data(&mut header, &entry_tar_path, file)
                .map_err(|e| archive_failed(&path, &e))?;
        }
    }

    Ok(())
}

fn archive_failed(path: &Path, err: &std::io::Error) -> Error {
    PackageError::ArchiveFailed {
        message: format!("adding {}: {err}", path.display()),
    }
    .into()
}
