//! Dependency installation into a build prefix
//!
//! Artifacts are copied (never linked) out of the global store so a
//! misbehaving build script cannot reach shared state, then symlink-treed
//! into `destdir`. The applied diff lands under `metadir`, and cleanup
//! consumes it.

use crate::symlink::{symlink_tree, unsymlink_tree, LinkRecord};
use crate::{resolve_closure, Registry, Resolved};
use crossforge_errors::{DepsError, Error};
use crossforge_platform::TargetPlatform;
use crossforge_store::{copy_dir_recursive, ArtifactStore};
use crossforge_types::{PackageSpec, Prefix};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// What an installation did, echoed back to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallReport {
    pub resolved: Vec<Resolved>,
    /// Set when any dependency came in through the stdlib bypass; the
    /// caller must then re-fetch sources and artifacts unpinned.
    pub stdlib_used: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DepsRecord {
    artifacts: Vec<PathBuf>,
    links: LinkRecord,
}

/// Installs dependency artifacts into one build prefix
pub struct DepInstaller<'a> {
    store: &'a ArtifactStore,
    prefix: &'a Prefix,
    platform: TargetPlatform,
}

impl<'a> DepInstaller<'a> {
    #[must_use]
    pub fn new(store: &'a ArtifactStore, prefix: &'a Prefix, platform: TargetPlatform) -> Self {
        Self {
            store,
            prefix,
            platform,
        }
    }

    fn record_path(&self) -> PathBuf {
        self.prefix
            .metadir()
            .join(format!("deps-{}.json", self.platform.triplet()))
    }

    /// Resolve, copy, and symlink-tree the dependency closure
    ///
    /// # Errors
    ///
    /// Fails when resolution fails or an artifact is not installed in the
    /// global store. Re-running over an existing install is a no-op.
    pub async fn install(
        &self,
        registry: &dyn Registry,
        specs: &[PackageSpec],
    ) -> Result<InstallReport, Error> {
        let julia_version = self.julia_version();
        let closure = resolve_closure(registry, specs, julia_version.as_ref()).await?;

        self.write_project(specs, &closure.entries).await?;

        let mut record = self.read_record().await.unwrap_or_default();
        let destdir = self.prefix.destdir(&self.platform);
        fs::create_dir_all(&destdir).await?;

        for entry in &closure.entries {
            let hash = entry.tree_hash.as_ref().ok_or_else(|| {
                DepsError::ResolutionFailed {
                    package: entry.name.clone(),
                    message: "closure entry has no tree hash".to_string(),
                }
            })?;

            let stored = self.store.resolve(hash).await.map_err(|_| {
                DepsError::ArtifactUnavailable {
                    package: entry.name.clone(),
                    hash: hash.to_hex(),
                }
            })?;

            let per_build = self.prefix.artifact_dir(&self.platform, hash);
            if fs::metadata(&per_build).await.is_err() {
                copy_dir_recursive(&stored, &per_build).await?;
            }
            if !record.artifacts.contains(&per_build) {
                record.artifacts.push(per_build.clone());
            }

            symlink_tree(&per_build, &destdir, &mut record.links).await?;
        }

        self.write_record(&record).await?;

        Ok(InstallReport {
            resolved: closure.entries,
            stdlib_used: closure.stdlib_used,
        })
    }

    /// Reverse the symlink-tree step. Uses the recorded diff when
    /// present; otherwise rescans the per-build artifact copies.
    ///
    /// # Errors
    ///
    /// Returns an error on filesystem failures while removing links.
    pub async fn cleanup(&self) -> Result<(), Error> {
        let destdir = self.prefix.destdir(&self.platform);

        match self.read_record().await {
            Some(record) => {
                for link in &record.links.links {
                    match fs::symlink_metadata(link).await {
                        Ok(meta) if meta.file_type().is_symlink() => {
                            fs::remove_file(link).await?;
                        }
                        // Replaced or already gone; the audit step owns
                        // whatever is there now.
                        _ => {}
                    }
                }
                for dir in record.links.dirs.iter().rev() {
                    let _ = fs::remove_dir(dir).await; // only if empty
                }
                let _ = fs::remove_file(self.record_path()).await;
            }
            None => {
                let artifacts_dir = self.prefix.artifacts_dir(&self.platform);
                let Ok(mut entries) = fs::read_dir(&artifacts_dir).await else {
                    return Ok(());
                };
                while let Some(entry) = entries.next_entry().await? {
                    unsymlink_tree(&entry.path(), &destdir).await?;
                }
            }
        }

        Ok(())
    }

    fn julia_version(&self) -> Option<Version> {
        self.platform
            .extensions()
            .get("julia_version")
            .and_then(|v| Version::parse(v).ok())
    }

    async fn write_project(
        &self,
        specs: &[PackageSpec],
        closure: &[Resolved],
    ) -> Result<(), Error> {
        #[derive(Serialize)]
        struct Project<'p> {
            requested: &'p [PackageSpec],
            resolved: &'p [Resolved],
        }

        let dir = self.prefix.project_dir(&self.platform);
        fs::create_dir_all(&dir).await?;
        let body = serde_json::to_vec_pretty(&Project {
            requested: specs,
            resolved: closure,
        })
        .map_err(|e| Error::internal(format!("project serialisation failed: {e}")))?;
        fs::write(dir.join("project.json"), body).await?;
        Ok(())
    }

    async fn read_record(&self) -> Option<DepsRecord> {
        let raw = fs::read(self.record_path()).await.ok()?;
        serde_json::from_slice(&raw).ok()
    }

    async fn write_record(&self, record: &DepsRecord) -> Result<(), Error> {
        fs::create_dir_all(self.prefix.metadir()).await?;
        let body = serde_json::to_vec_pretty(record)
            .map_err(|e| Error::internal(format!("record serialisation failed: {e}")))?;
        fs::write(self.record_path(), body).await?;
        Ok(())
    }
}
