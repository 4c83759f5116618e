#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Build orchestration
//!
//! Glues the pipeline together: normalise the platform, select and mount
//! shards, stage sources, install dependencies, emit toolchain files,
//! hand the build to the external [`Runner`], package the result, and
//! tear everything down on every exit path.

mod environment;

pub use environment::BuildEnvironment;

use async_trait::async_trait;
use crossforge_config::Config;
use crossforge_deps::Registry;
use crossforge_errors::Error;
use crossforge_package::PackageResult;
use crossforge_platform::Platform;
use crossforge_shards::{SelectionPreferences, ShardCatalog};
use crossforge_sources::Source;
use crossforge_store::ArtifactStore;
use crossforge_types::{Compiler, PackageSpec};
use semver::Version;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything one build needs from the caller
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub name: String,
    pub version: Version,
    pub target: Platform,
    pub sources: Vec<Source>,
    pub dependencies: Vec<PackageSpec>,
    pub compilers: BTreeSet<Compiler>,
    /// Shell script executed inside the sandbox
    pub script: String,
    pub preferences: SelectionPreferences,
}

/// The opaque sandbox executor. Implementations run one command inside
/// the composed root filesystem; signal delivery and wall-clock timeouts
/// live on their side of the contract.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run `command` with `env`, with each `(host_path, sandbox_path)`
    /// mapping layered into the sandbox
    async fn run(
        &self,
        command: &[String],
        env: &HashMap<String, String>,
        mounts: &[(PathBuf, String)],
    ) -> Result<(), Error>;
}

/// Cooperative cancellation: checked between pipeline stages
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// Run one build end to end and package its install prefix.
///
/// Teardown runs on every exit path, including build failure and
/// cancellation; unmount failures during teardown are demoted so the
/// cleanup sweep completes.
///
/// # Errors
///
/// Returns the first pipeline error; a teardown error only surfaces when
/// the build itself succeeded.
#[allow(clippy::too_many_arguments)]
pub async fn execute_build(
    config: &Config,
    catalog: &ShardCatalog,
    store: &ArtifactStore,
    registry: &dyn Registry,
    runner: &dyn Runner,
    request: &BuildRequest,
    out_base: &Path,
    force: bool,
    cancel: &CancelToken,
) -> Result<PackageResult, Error> {
    cancel.check()?;
    let mut env = BuildEnvironment::setup(config, catalog, store, registry, request).await?;

    let result = async {
        cancel.check()?;
        env.run(runner, &request.script).await?;
        cancel.check()?;
        env.package(out_base, &request.version, force).await
    }
    .await;

    let teardown = env.teardown().await;

    match result {
        Ok(package) => teardown.map(|()| package),
        Err(err) => {
            if let Err(teardown_err) = teardown {
                tracing::warn!("teardown after failed build also failed: {teardown_err}");
            }
            Err(err)
        }
    }
}
