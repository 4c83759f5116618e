//! Core `BuildEnvironment`: construction, execution, teardown

use crate::{BuildRequest, Runner};
use crossforge_config::Config;
use crossforge_deps::{DepInstaller, InstallReport, Registry};
use crossforge_errors::Error;
use crossforge_mount::Mounter;
use crossforge_package::PackageResult;
use crossforge_platform::{Platform, TargetPlatform};
use crossforge_shards::{build_host, choose_shards, CompilerShard, ShardCatalog, ShardName};
use crossforge_store::ArtifactStore;
use crossforge_toolchains::{write_toolchain_files, ToolchainOptions};
use crossforge_types::Prefix;
use semver::Version;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// In-sandbox path the workspace prefix is mapped to
const SANDBOX_WORKSPACE: &str = "/workspace";

/// One build's assembled sandbox: workspace, mounted shards, toolchain
/// files, and installed dependencies
pub struct BuildEnvironment<'a> {
    config: &'a Config,
    catalog: &'a ShardCatalog,
    store: &'a ArtifactStore,
    prefix: Prefix,
    requested: Platform,
    target: TargetPlatform,
    host: TargetPlatform,
    shards: Vec<CompilerShard>,
    mounted: Vec<CompilerShard>,
    env_vars: HashMap<String, String>,
    deps_report: Option<InstallReport>,
    released: bool,
}

impl<'a> BuildEnvironment<'a> {
    /// Assemble the whole environment: select shards, verify their
    /// artifacts, create the nonce-suffixed workspace, mount, stage
    /// sources, install dependencies, and emit toolchain files.
    ///
    /// Partially mounted state is rolled back before an error returns.
    ///
    /// # Errors
    ///
    /// Propagates selection, staging, resolution, and mount errors.
    pub async fn setup(
        config: &'a Config,
        catalog: &'a ShardCatalog,
        store: &'a ArtifactStore,
        registry: &dyn Registry,
        request: &BuildRequest,
    ) -> Result<BuildEnvironment<'a>, Error> {
        let target = request.target.build_envify();
        let host = build_host();

        let shards = choose_shards(
            catalog,
            &request.target,
            &request.compilers,
            &request.preferences,
        )?;
        // Every selected shard must already be in the store; this covers
        // shards hosted on both build hosts (musl and the glibc Rust
        // host), which the selection includes.
        for shard in &shards {
            catalog.path(shard, store).await?;
        }

        // The nonce lets a later audit recognise leaked absolute
        // workspace paths in built binaries.
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let root = config.builds_dir().join(&nonce).join(&request.name);
        let prefix = Prefix::create(&root, &target, &host).await?;

        let mut env = BuildEnvironment {
            config,
            catalog,
            store,
            prefix,
            requested: request.target.clone(),
            target,
            host,
            shards,
            mounted: Vec::new(),
            env_vars: HashMap::new(),
            deps_report: None,
            released: false,
        };

        if let Err(err) = env.populate(registry, request).await {
            let _ = env.teardown().await;
            return Err(err);
        }

        Ok(env)
    }

    async fn populate(
        &mut self,
        registry: &dyn Registry,
        request: &BuildRequest,
    ) -> Result<(), Error> {
        let mounter = self.mounter();
        for shard in self.shards.clone() {
            mounter.mount(&shard, self.prefix.root()).await?;
            self.mounted.push(shard);
        }

        crossforge_sources::stage_all(&request.sources, &self.prefix).await?;

        let installer = DepInstaller::new(self.store, &self.prefix, self.target.clone());
        let report = installer.install(registry, &request.dependencies).await?;
        if report.stdlib_used {
            tracing::debug!("stdlib dependencies present; sources must be re-fetched unpinned");
        }
        self.deps_report = Some(report);

        let opts = ToolchainOptions {
            clang_use_lld: false,
            gcc_version: self.selected_gcc_version(),
        };
        write_toolchain_files(&self.prefix, &self.target, &self.host, &opts).await?;

        self.env_vars = self.build_env_vars();
        Ok(())
    }

    fn mounter(&self) -> Mounter<'a> {
        Mounter::new(self.config, self.catalog, self.store.clone())
    }

    /// The GCC version the selector pinned for the build target, if C
    /// compilers were requested
    fn selected_gcc_version(&self) -> Option<Version> {
        let target_aa = self.target.abi_agnostic();
        self.shards
            .iter()
            .find(|s| s.name == ShardName::GccBootstrap && s.target.as_ref() == Some(&target_aa))
            .map(|s| s.version.clone())
    }

    fn build_env_vars(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        let full_triplet = self.target.triplet();
        vars.insert("prefix".to_string(), format!("{SANDBOX_WORKSPACE}/destdir"));
        vars.insert("WORKSPACE".to_string(), SANDBOX_WORKSPACE.to_string());
        vars.insert("target".to_string(), self.target.aatriplet());
        vars.insert("bb_full_target".to_string(), full_triplet.clone());
        vars.insert("MACHTYPE".to_string(), self.host.aatriplet());
        vars.insert(
            "nproc".to_string(),
            std::thread::available_parallelism()
                .map_or(1, std::num::NonZeroUsize::get)
                .to_string(),
        );
        vars.insert(
            "PATH".to_string(),
            format!("/opt/bin/{full_triplet}:/usr/local/bin:/usr/bin:/bin"),
        );
        if self.config.use_ccache {
            vars.insert("USE_CCACHE".to_string(), "true".to_string());
        }
        vars
    }

    #[must_use]
    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    #[must_use]
    pub fn target(&self) -> &TargetPlatform {
        &self.target
    }

    #[must_use]
    pub fn shards(&self) -> &[CompilerShard] {
        &self.shards
    }

    #[must_use]
    pub fn env_vars(&self) -> &HashMap<String, String> {
        &self.env_vars
    }

    #[must_use]
    pub fn deps_report(&self) -> Option<&InstallReport> {
        self.deps_report.as_ref()
    }

    /// Hand the build script to the sandbox runner
    ///
    /// # Errors
    ///
    /// Propagates mapping computation failures and the runner's own
    /// error.
    pub async fn run(&self, runner: &dyn Runner, script: &str) -> Result<(), Error> {
        let command = vec![
            "/bin/bash".to_string(),
            "-c".to_string(),
            script.to_string(),
        ];

        let mut mounts = vec![(
            self.prefix.root().to_path_buf(),
            SANDBOX_WORKSPACE.to_string(),
        )];
        mounts.extend(self.mounter().shard_mappings(&self.shards, self.prefix.root())?);

        runner.run(&command, &self.env_vars, &mounts).await
    }

    /// Package the install staging tree
    ///
    /// # Errors
    ///
    /// Propagates packaging errors, including `OutputExists`.
    pub async fn package(
        &self,
        out_base: &Path,
        version: &Version,
        force: bool,
    ) -> Result<PackageResult, Error> {
        crossforge_package::package(
            self.store,
            &self.prefix.destdir(&self.target),
            out_base,
            version,
            &self.requested,
            force,
        )
        .await
    }

    /// Release everything this build holds: dependency symlinks, shard
    /// mounts (failures demoted), and the nonce-suffixed workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace directory cannot be removed.
    pub async fn teardown(&mut self) -> Result<(), Error> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let installer = DepInstaller::new(self.store, &self.prefix, self.target.clone());
        if let Err(err) = installer.cleanup().await {
            tracing::warn!("dependency cleanup failed: {err}");
        }

        let mounter = self.mounter();
        for shard in self.mounted.iter().rev() {
            let _ = mounter.unmount(shard, self.prefix.root(), false).await;
        }
        self.mounted.clear();

        let workspace = workspace_root(self.prefix.root());
        fs::remove_dir_all(&workspace)
            .await
            .map_err(|e| Error::io_with_path(&e, &workspace))?;
        Ok(())
    }
}

impl Drop for BuildEnvironment<'_> {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                prefix = %self.prefix.root().display(),
                "build environment dropped without teardown; workspace left behind"
            );
        }
    }
}

/// The nonce directory that owns this build's prefix
fn workspace_root(prefix_root: &Path) -> PathBuf {
    prefix_root
        .parent()
        .map_or_else(|| prefix_root.to_path_buf(), Path::to_path_buf)
}
