//! Archive extraction via host tools
//!
//! Extraction shells out to the host `tar` and `unzip`; they are far
//! faster than decoding in-process and the formats involved are fixed.

use crossforge_errors::{Error, SourceError};
use std::path::Path;
use tokio::process::Command;

/// Recognised archive formats, detected by file name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    TarZst,
    Zip,
}

impl ArchiveFormat {
    const SUFFIXES: &'static [(&'static str, Self)] = &[
        (".tar.gz", Self::TarGz),
        (".tgz", Self::TarGz),
        (".tar.bz2", Self::TarBz2),
        (".tar.xz", Self::TarXz),
        (".tar.zst", Self::TarZst),
        (".tar", Self::Tar),
        (".zip", Self::Zip),
    ];

    /// Detect the format from a file name, or `None` for unknown suffixes
    #[must_use]
    pub fn detect(name: &str) -> Option<Self> {
        Self::SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, format)| *format)
    }

    /// File name with this format's suffix removed
    #[must_use]
    pub fn strip_suffix(self, name: &str) -> String {
        Self::SUFFIXES
            .iter()
            .filter(|(_, format)| *format == self)
            .find_map(|(suffix, _)| name.strip_suffix(suffix))
            .unwrap_or(name)
            .to_string()
    }
}

/// Extract `archive` into the existing directory `dest`
///
/// # Errors
///
/// Returns [`SourceError::ExtractionFailed`] if the host tool exits
/// non-zero or cannot be spawned.
pub(crate) async fn extract(
    format: ArchiveFormat,
    archive: &Path,
    dest: &Path,
) -> Result<(), Error> {
    let archive_str = archive.display().to_string();
    let dest_str = dest.display().to_string();

    let mut command = match format {
        ArchiveFormat::Zip => {
            let mut c = Command::new("unzip");
            c.args(["-q", &archive_str, "-d", &dest_str]);
            c
        }
        // Modern tar picks the decompressor from the file itself.
        _ => {
            let mut c = Command::new("tar");
            c.args(["-x", "-f", &archive_str, "-C", &dest_str]);
            c
        }
    };

    let output = command.output().await.map_err(|e| {
        SourceError::ExtractionFailed {
            message: format!("could not spawn extractor for {archive_str}: {e}"),
        }
    })?;

    if !output.status.success() {
        return Err(SourceError::ExtractionFailed {
            message: format!(
                "extracting {archive_str}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
        .into());
    }
    Ok(())
}
