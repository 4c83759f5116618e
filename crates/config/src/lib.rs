#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Process-wide configuration for crossforge
//!
//! All environment-driven state is read once into an immutable [`Config`]
//! value and passed explicitly down the call graph; nothing else consults
//! the environment.

pub mod constants;

use crossforge_types::Runner;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variables the orchestrator recognises
pub mod env_keys {
    pub const STORAGE_DIR: &str = "STORAGE_DIR";
    pub const AUTOMATIC_APPLE: &str = "AUTOMATIC_APPLE";
    pub const RUNNER: &str = "RUNNER";
    pub const USE_SQUASHFS: &str = "USE_SQUASHFS";
    pub const ALLOW_ECRYPTFS: &str = "ALLOW_ECRYPTFS";
    pub const USE_CCACHE: &str = "USE_CCACHE";
}

/// Immutable process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub storage_dir: PathBuf,
    pub runner: Runner,
    pub use_squashfs: bool,
    pub automatic_apple: bool,
    pub allow_ecryptfs: bool,
    pub use_ccache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            runner: Runner::Auto,
            use_squashfs: false,
            automatic_apple: false,
            allow_ecryptfs: false,
            use_ccache: false,
        }
    }
}

impl Config {
    /// Build the configuration from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary lookup (used by tests)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_dir = lookup(env_keys::STORAGE_DIR)
            .map_or_else(default_storage_dir, PathBuf::from);

        let runner = match lookup(env_keys::RUNNER) {
            None => Runner::Auto,
            Some(value) => Runner::from_env_value(&value).unwrap_or_else(|| {
                tracing::warn!("unknown RUNNER value {value:?}, ignoring");
                Runner::Auto
            }),
        };

        // Squashfs is the norm on CI and under the privileged runner; the
        // Docker runner cannot loop-mount.
        let use_squashfs = match lookup(env_keys::USE_SQUASHFS).as_deref() {
            Some("true") => true,
            Some("false") => false,
            _ => match runner {
                Runner::Docker => false,
                Runner::Privileged => true,
                Runner::Auto | Runner::UserNs => lookup("CI").is_some(),
            },
        };

        let flag = |key: &str| lookup(key).as_deref() == Some("true");

        Self {
            storage_dir,
            runner,
            use_squashfs,
            automatic_apple: flag(env_keys::AUTOMATIC_APPLE),
            allow_ecryptfs: flag(env_keys::ALLOW_ECRYPTFS),
            use_ccache: flag(env_keys::USE_CCACHE),
        }
    }

    /// Content-addressed artifact store root
    #[must_use]
    pub fn artifacts_dir(&self) -> PathBuf {
        self.storage_dir.join(constants::ARTIFACTS_SUBDIR)
    }

    /// Downloaded source archives
    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.storage_dir.join(constants::DOWNLOADS_SUBDIR)
    }

    /// Per-build workspace roots
    #[must_use]
    pub fn builds_dir(&self) -> PathBuf {
        self.storage_dir.join(constants::BUILDS_SUBDIR)
    }

    /// Per-UID squashfs copies
    #[must_use]
    pub fn mounts_dir(&self) -> PathBuf {
        self.storage_dir.join(constants::MOUNTS_SUBDIR)
    }

    /// ccache directory handed to builds when `use_ccache` is set
    #[must_use]
    pub fn ccache_dir(&self) -> PathBuf {
        self.storage_dir.join(constants::CCACHE_SUBDIR)
    }

    /// Static manifest the shard catalog decodes at first use
    #[must_use]
    pub fn shard_manifest_path(&self) -> PathBuf {
        self.storage_dir.join(constants::SHARD_MANIFEST)
    }

    /// Sentinel recording Xcode EULA acceptance
    #[must_use]
    pub fn eula_sentinel_path(&self) -> PathBuf {
        self.storage_dir.join(constants::EULA_SENTINEL)
    }

    /// Whether the Xcode EULA has been accepted, either via the
    /// environment flag or the persistent sentinel
    #[must_use]
    pub fn apple_sdk_accepted(&self) -> bool {
        self.automatic_apple || self.eula_sentinel_path().exists()
    }

    #[must_use]
    pub fn with_storage_dir(mut self, dir: &Path) -> Self {
        self.storage_dir = dir.to_path_buf();
        self
    }
}

fn default_storage_dir() -> PathBuf {
    std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("crossforge")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_of<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn unknown_runner_resets_to_auto() {
        let config = Config::from_lookup(lookup_of(&[("RUNNER", "podman")]));
        assert_eq!(config.runner, Runner::Auto);
    }

    #[test]
    fn squashfs_defaults_follow_the_runner() {
        let docker = Config::from_lookup(lookup_of(&[("RUNNER", "docker"), ("CI", "true")]));
        assert!(!docker.use_squashfs);

        let privileged = Config::from_lookup(lookup_of(&[("RUNNER", "privileged")]));
        assert!(privileged.use_squashfs);

        let ci = Config::from_lookup(lookup_of(&[("CI", "true")]));
        assert!(ci.use_squashfs);

        let forced_off =
            Config::from_lookup(lookup_of(&[("RUNNER", "privileged"), ("USE_SQUASHFS", "false")]));
        assert!(!forced_off.use_squashfs);
    }

    #[test]
    fn storage_dir_override_wins() {
        let config = Config::from_lookup(lookup_of(&[("STORAGE_DIR", "/srv/forge")]));
        assert_eq!(config.storage_dir, PathBuf::from("/srv/forge"));
        assert_eq!(config.artifacts_dir(), PathBuf::from("/srv/forge/artifacts"));
    }
}
