//! Dependency specification types

use crossforge_hash::TreeHash;
use semver::Version;
use serde::{Deserialize, Serialize};

/// One requested dependency: a package name, optionally pinned to a
/// version, a tree hash, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_hash: Option<TreeHash>,
}

impl PackageSpec {
    /// Spec pinned by name only
    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            tree_hash: None,
        }
    }

    /// Spec pinned to a version
    #[must_use]
    pub fn at_version(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version: Some(version),
            tree_hash: None,
        }
    }

    /// Spec pinned to a concrete artifact tree
    #[must_use]
    pub fn at_tree(name: impl Into<String>, tree_hash: TreeHash) -> Self {
        Self {
            name: name.into(),
            version: None,
            tree_hash: Some(tree_hash),
        }
    }

    /// When both a version and a tree hash are given, the tree hash wins;
    /// drop the version so downstream resolution cannot disagree with it.
    #[must_use]
    pub fn collapsed(mut self) -> Self {
        if self.tree_hash.is_some() {
            self.version = None;
        }
        self
    }

    /// Whether this package follows the artifact-dependency naming
    /// convention (`_jll` suffix)
    #[must_use]
    pub fn is_artifact_package(&self) -> bool {
        self.name.ends_with("_jll")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_hash_wins_over_version() {
        let hash = TreeHash::from_bytes([7u8; 20]);
        let spec = PackageSpec {
            name: "Zlib_jll".to_string(),
            version: Some(Version::new(1, 2, 13)),
            tree_hash: Some(hash),
        }
        .collapsed();

        assert_eq!(spec.version, None);
        assert_eq!(spec.tree_hash, Some(hash));

        let unpinned = PackageSpec::at_version("Zlib_jll", Version::new(1, 2, 13)).collapsed();
        assert_eq!(unpinned.version, Some(Version::new(1, 2, 13)));
    }

    #[test]
    fn jll_suffix_detection() {
        assert!(PackageSpec::by_name("OpenSSL_jll").is_artifact_package());
        assert!(!PackageSpec::by_name("OpenSSL").is_artifact_package());
    }
}
