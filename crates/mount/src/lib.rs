#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Shard materialisation: compose a per-build root filesystem
//!
//! Unpacked shards are served straight from the artifact store and only
//! bind-mapped by the sandbox driver. Squashfs shards are loop-mounted
//! under `<build_root>/.mounts/`, which requires privilege on Linux.
//! Mount and unmount are both idempotent; unmount failures on teardown
//! are demoted to warnings unless the caller insists.

mod privilege;

use crossforge_config::Config;
use crossforge_errors::{Error, MountError};
use crossforge_shards::{ArchiveKind, CompilerShard, ShardCatalog, ShardName};
use crossforge_store::ArtifactStore;
use crossforge_types::Runner;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Mount engine for one process
#[derive(Clone)]
pub struct Mounter<'c> {
    config: &'c Config,
    catalog: &'c ShardCatalog,
    store: ArtifactStore,
}

impl<'c> Mounter<'c> {
    #[must_use]
    pub fn new(config: &'c Config, catalog: &'c ShardCatalog, store: ArtifactStore) -> Self {
        Self {
            config,
            catalog,
            store,
        }
    }

    /// Where a shard materialises on the host filesystem
    ///
    /// # Errors
    ///
    /// Returns an error if the shard is not registered in the catalog.
    pub fn mount_path(&self, shard: &CompilerShard, build_root: &Path) -> Result<PathBuf, Error> {
        match shard.kind {
            ArchiveKind::Squashfs => Ok(build_root
                .join(crossforge_types::prefix::MOUNTS_DIR)
                .join(shard.dir_name())),
            ArchiveKind::Unpacked => {
                let hash = self.catalog.tree_hash(shard)?;
                Ok(self.store.artifact_path(&hash))
            }
        }
    }

    /// Where a shard appears inside the sandbox
    #[must_use]
    pub fn map_target(shard: &CompilerShard) -> String {
        let host = shard.host.aatriplet();
        match (&shard.name, &shard.target) {
            (ShardName::Rootfs, _) => "/".to_string(),
            // Rust toolchains are co-located per target under the host
            // tree so rustc's own probing finds them.
            (ShardName::RustToolchain, Some(target)) => format!(
                "/opt/{host}/{}-{}-{}",
                shard.name,
                shard.version,
                target.aatriplet()
            ),
            (_, Some(target)) => {
                format!("/opt/{}/{}-{}", target.aatriplet(), shard.name, shard.version)
            }
            (_, None) => format!("/opt/{host}/{}-{}", shard.name, shard.version),
        }
    }

    /// Ordered `(mount_path, sandbox_path)` pairs for the sandbox driver.
    ///
    /// Rootfs is omitted (it *is* the container root), and the list is
    /// reversed from input order because the driver layers back-to-front.
    ///
    /// # Errors
    ///
    /// Returns an error if any shard is unregistered.
    pub fn shard_mappings(
        &self,
        shards: &[CompilerShard],
        build_root: &Path,
    ) -> Result<Vec<(PathBuf, String)>, Error> {
        let mut mappings = Vec::new();
        for shard in shards {
            if shard.name == ShardName::Rootfs {
                continue;
            }
            mappings.push((self.mount_path(shard, build_root)?, Self::map_target(shard)));
        }
        mappings.reverse();
        Ok(mappings)
    }

    /// Materialise a shard under the build root and return its mount
    /// path. Idempotent: an already-mounted shard is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::SdkNotAccepted`] for Apple SDK shards
    /// without recorded EULA acceptance, and [`MountError::MountFailed`]
    /// when the loop mount itself fails.
    pub async fn mount(&self, shard: &CompilerShard, build_root: &Path) -> Result<PathBuf, Error> {
        if shard.is_apple_sdk() && !self.config.apple_sdk_accepted() {
            return Err(MountError::SdkNotAccepted.into());
        }

        let mount_path = self.mount_path(shard, build_root)?;
        if shard.kind == ArchiveKind::Unpacked || !self.loop_mounts_enabled() {
            return Ok(mount_path);
        }

        if is_mounted(&mount_path).await {
            return Ok(mount_path);
        }

        let archive = self.squashfs_file(shard).await?;
        self.check_ecryptfs(&archive).await?;

        fs::create_dir_all(&mount_path)
            .await
            .map_err(|e| Error::io_with_path(&e, &mount_path))?;

        let archive_str = archive.display().to_string();
        let mount_str = mount_path.display().to_string();
        let output = privilege::run_privileged(&[
            "mount", "-o", "ro,loop", &archive_str, &mount_str,
        ])
        .await?;

        if !output.status.success() {
            return Err(MountError::MountFailed {
                archive: archive_str,
                mountpoint: mount_str,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        tracing::debug!(shard = %shard, path = %mount_path.display(), "mounted");
        Ok(mount_path)
    }

    /// Release a shard's mount. Idempotent; failures are demoted to a
    /// warning unless `fail_on_error` is set.
    ///
    /// # Errors
    ///
    /// With `fail_on_error`, returns [`MountError::UnmountFailed`] when
    /// the umount command fails.
    pub async fn unmount(
        &self,
        shard: &CompilerShard,
        build_root: &Path,
        fail_on_error: bool,
    ) -> Result<(), Error> {
        if shard.kind == ArchiveKind::Unpacked || !self.loop_mounts_enabled() {
            return Ok(());
        }

        let mount_path = self.mount_path(shard, build_root)?;
        if is_mounted(&mount_path).await {
            let mount_str = mount_path.display().to_string();
            let output = privilege::run_privileged(&["umount", &mount_str]).await?;
            if !output.status.success() {
                let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
                if fail_on_error {
                    return Err(MountError::UnmountFailed {
                        mountpoint: mount_str,
                        message,
                    }
                    .into());
                }
                tracing::warn!(mountpoint = mount_str, "unmount failed: {message}");
                return Ok(());
            }
        }

        let _ = fs::remove_dir(&mount_path).await;
        let mounts_dir = build_root.join(crossforge_types::prefix::MOUNTS_DIR);
        let _ = fs::remove_dir(&mounts_dir).await; // only removed when empty

        Ok(())
    }

    /// Loop mounts happen only on Linux under the user-namespace or
    /// Docker runners; everywhere else (including an unresolved `Auto`
    /// runner) materialisation is the sandbox driver's problem.
    fn loop_mounts_enabled(&self) -> bool {
        cfg!(target_os = "linux")
            && matches!(self.config.runner, Runner::UserNs | Runner::Docker)
    }

    /// The squashfs file to loop-mount. When the store copy is not owned
    /// by the invoking UID a per-UID copy is generated once, so the
    /// kernel's ownership checks pass.
    async fn squashfs_file(&self, shard: &CompilerShard) -> Result<PathBuf, Error> {
        let hash = self.catalog.tree_hash(shard)?;
        let stored = self.store.resolve(&hash).await?;
        let image = stored.join(shard.artifact_name());
        let image = if fs::metadata(&image).await.is_ok() {
            image
        } else {
            stored
        };

        let uid = privilege::current_uid();
        if file_uid(&image).await == Some(uid) {
            return Ok(image);
        }

        let per_uid = self
            .config
            .mounts_dir()
            .join(format!("{uid}-{}", shard.artifact_name()));
        if fs::metadata(&per_uid).await.is_err() {
            fs::create_dir_all(self.config.mounts_dir()).await?;
            fs::copy(&image, &per_uid)
                .await
                .map_err(|e| Error::io_with_path(&e, &image))?;
        }
        Ok(per_uid)
    }

    /// Loop mounts through an encrypted home directory fail in confusing
    /// ways; refuse them unless explicitly allowed.
    async fn check_ecryptfs(&self, archive: &Path) -> Result<(), Error> {
        if self.config.allow_ecryptfs {
            return Ok(());
        }
        if on_ecryptfs(archive).await {
            return Err(MountError::MountFailed {
                archive: archive.display().to_string(),
                mountpoint: String::new(),
                message: "archive lives on an eCryptfs mount; set ALLOW_ECRYPTFS=true".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn file_uid(path: &Path) -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).await.ok().map(|m| m.uid())
}

#[cfg(not(unix))]
async fn file_uid(_path: &Path) -> Option<u32> {
    None
}

/// Whether `path` is an active mountpoint per the kernel's mount table
async fn is_mounted(path: &Path) -> bool {
    let Ok(table) = fs::read_to_string("/proc/mounts").await else {
        return false;
    };
    let needle = path.display().to_string();
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|mountpoint| mountpoint == needle)
}

/// Whether `path` lives under an eCryptfs mount
async fn on_ecryptfs(path: &Path) -> bool {
    let Ok(table) = fs::read_to_string("/proc/mounts").await else {
        return false;
    };
    table
        .lines()
        .filter(|line| line.split_whitespace().nth(2) == Some("ecryptfs"))
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|mountpoint| path.starts_with(mountpoint))
}
