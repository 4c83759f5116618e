//! Shard catalog: decode the static artifact manifest
//!
//! The manifest is a TOML table keyed by artifact file name, each entry
//! carrying the artifact's git tree hash. Names are decoded by a fixed
//! grammar; entries that do not decode are skipped so the manifest can
//! carry non-shard artifacts too.

use crate::{ArchiveKind, CompilerShard, ShardName};
use crossforge_config::Config;
use crossforge_errors::{Error, ShardError};
use crossforge_hash::TreeHash;
use crossforge_platform::Platform;
use crossforge_store::ArtifactStore;
use regex::Regex;
use semver::Version;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, OnceLock};

/// `<name>[-<target>].<version>.<host>.<ext>`
static SHARD_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[^-]+)(-(?P<target>.+))?\.(?P<version>v[\d.]+(?:-[^.]+)?)\.(?P<host>[^0-9].+-.+)\.(?P<ext>\w+)$")
        .expect("shard name grammar compiles")
});

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(rename = "git-tree-sha1")]
    git_tree_sha1: TreeHash,
}

/// Decoded shard manifest
#[derive(Debug)]
pub struct ShardCatalog {
    shards: Vec<CompilerShard>,
    tree_hashes: HashMap<String, TreeHash>,
}

static SHARED: OnceLock<ShardCatalog> = OnceLock::new();

impl ShardCatalog {
    /// Load and decode a manifest file
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::ManifestError`] if the file cannot be read or
    /// is not valid TOML. Entries whose names do not decode are skipped.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let manifest_error = |message: String| -> Error {
            ShardError::ManifestError {
                path: path.display().to_string(),
                message,
            }
            .into()
        };

        let raw = std::fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
        let entries: HashMap<String, ManifestEntry> =
            toml::from_str(&raw).map_err(|e| manifest_error(e.to_string()))?;

        Ok(Self::from_entries(
            entries
                .into_iter()
                .map(|(name, entry)| (name, entry.git_tree_sha1)),
        ))
    }

    /// Build a catalog from `(artifact_name, tree_hash)` pairs
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, TreeHash)>,
    {
        let mut shards = Vec::new();
        let mut tree_hashes = HashMap::new();

        for (name, hash) in entries {
            match Self::decode_name(&name) {
                Some(shard) => {
                    tree_hashes.insert(name, hash);
                    shards.push(shard);
                }
                None => tracing::debug!(name, "manifest entry is not a shard, skipping"),
            }
        }

        shards.sort_by(|a, b| a.artifact_name().cmp(&b.artifact_name()));
        Self {
            shards,
            tree_hashes,
        }
    }

    /// The catalog for this process, decoded once from the configured
    /// manifest path
    ///
    /// # Errors
    ///
    /// Propagates the manifest load error on first use.
    pub fn shared(config: &Config) -> Result<&'static Self, Error> {
        if let Some(catalog) = SHARED.get() {
            return Ok(catalog);
        }
        let catalog = Self::load(&config.shard_manifest_path())?;
        Ok(SHARED.get_or_init(|| catalog))
    }

    /// Decode one artifact name into a shard; `None` when the name does
    /// not follow the shard grammar.
    #[must_use]
    pub fn decode_name(name: &str) -> Option<CompilerShard> {
        let caps = SHARD_NAME_RE.captures(name)?;

        let shard_name: ShardName = caps.name("name")?.as_str().parse().ok()?;
        let kind = ArchiveKind::parse(caps.name("ext")?.as_str())?;
        let version = Version::parse(caps.name("version")?.as_str().strip_prefix('v')?).ok()?;

        let host = match Platform::parse(caps.name("host")?.as_str()).ok()? {
            Platform::Target(p) => p.abi_agnostic(),
            Platform::Any => return None,
        };
        let target = match caps.name("target") {
            None => None,
            Some(m) => match Platform::parse(m.as_str()).ok()? {
                Platform::Target(p) => Some(p.abi_agnostic()),
                Platform::Any => return None,
            },
        };

        Some(CompilerShard {
            name: shard_name,
            version,
            host,
            target,
            kind,
        })
    }

    /// Every decoded shard
    #[must_use]
    pub fn all(&self) -> &[CompilerShard] {
        &self.shards
    }

    /// Tree hash of a shard's artifact
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Unregistered`] if the shard is not in the
    /// catalog.
    pub fn tree_hash(&self, shard: &CompilerShard) -> Result<TreeHash, Error> {
        self.tree_hashes
            .get(&shard.artifact_name())
            .copied()
            .ok_or_else(|| {
                ShardError::Unregistered {
                    name: shard.artifact_name(),
                }
                .into()
            })
    }

    /// Resolve a shard to its path in the artifact store
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Unregistered`] for unknown shards and
    /// [`ShardError::ArtifactMissing`] for registered shards whose
    /// artifact is not installed.
    pub async fn path(
        &self,
        shard: &CompilerShard,
        store: &ArtifactStore,
    ) -> Result<PathBuf, Error> {
        let hash = self.tree_hash(shard)?;
        if !store.contains(&hash).await {
            return Err(ShardError::ArtifactMissing {
                name: shard.artifact_name(),
                hash: hash.to_hex(),
            }
            .into());
        }
        Ok(store.artifact_path(&hash))
    }
}
