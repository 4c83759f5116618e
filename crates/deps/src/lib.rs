#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Artifact dependency resolution and installation
//!
//! Dependencies arrive as [`PackageSpec`]s, are closed over their `_jll`
//! dependency graphs through an external [`Registry`], copied per build
//! out of the global store, and symlink-treed into the install staging
//! directory. Installation records the applied diff so cleanup reverses
//! exactly what was done.

mod install;
mod symlink;

pub use install::{DepInstaller, InstallReport};
pub use symlink::{symlink_tree, unsymlink_tree, LinkRecord};

use async_trait::async_trait;
use crossforge_errors::{DepsError, Error};
use crossforge_hash::TreeHash;
use crossforge_types::PackageSpec;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// One fully resolved dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolved {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    /// Absent for stdlib-shipped packages, which need the stdlib lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_hash: Option<TreeHash>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
}

/// External registry seam: resolves package names to artifact trees.
/// The real client lives outside the orchestrator.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Resolve one spec to its artifact tree and direct dependencies
    async fn resolve(&self, spec: &PackageSpec) -> Result<Resolved, Error>;

    /// Resolve a stdlib-shipped package directly to a tree hash for a
    /// given `julia_version`, bypassing the normal resolver (which would
    /// collapse distinct `+buildN` suffixes).
    async fn stdlib_resolve(
        &self,
        name: &str,
        julia_version: Option<&Version>,
    ) -> Result<Resolved, Error>;
}

/// A resolved closure plus whether the stdlib bypass fired
#[derive(Debug, Clone)]
pub struct Closure {
    pub entries: Vec<Resolved>,
    /// True when any dependency arrived without a tree hash (a stdlib-
    /// shipped package); the caller must then re-fetch sources and
    /// artifacts unpinned.
    pub stdlib_used: bool,
}

/// Resolve the full dependency closure: any resolved dependency whose
/// name carries the `_jll` suffix is itself resolved, until fixpoint.
/// Stdlib entries (no tree hash) are then resolved through the stdlib
/// path.
///
/// # Errors
///
/// Propagates registry failures; a closure entry that still lacks a tree
/// hash after the stdlib pass is [`DepsError::StdlibResolutionFailed`].
pub async fn resolve_closure(
    registry: &dyn Registry,
    specs: &[PackageSpec],
    julia_version: Option<&Version>,
) -> Result<Closure, Error> {
    let mut queue: VecDeque<PackageSpec> =
        specs.iter().cloned().map(PackageSpec::collapsed).collect();
    let mut resolved: BTreeMap<String, Resolved> = BTreeMap::new();
    let mut seen: BTreeSet<String> = queue.iter().map(|s| s.name.clone()).collect();

    while let Some(spec) = queue.pop_front() {
        let entry = registry.resolve(&spec).await?;
        for dep in &entry.deps {
            if dep.ends_with("_jll") && seen.insert(dep.clone()) {
                queue.push_back(PackageSpec::by_name(dep.clone()));
            }
        }
        resolved.insert(entry.name.clone(), entry);
    }

    let mut stdlib_used = false;
    for entry in resolved.values_mut() {
        if entry.tree_hash.is_none() {
            stdlib_used = true;
            let stdlib = registry.stdlib_resolve(&entry.name, julia_version).await?;
            if stdlib.tree_hash.is_none() {
                return Err(DepsError::StdlibResolutionFailed {
                    package: entry.name.clone(),
                    message: "stdlib lookup returned no tree hash".to_string(),
                }
                .into());
            }
            entry.version = stdlib.version;
            entry.tree_hash = stdlib.tree_hash;
        }
    }

    Ok(Closure {
        entries: resolved.into_values().collect(),
        stdlib_used,
    })
}

/// In-memory registry used by tests and local resolution
#[derive(Debug, Default)]
pub struct StaticRegistry {
    packages: BTreeMap<String, Resolved>,
    stdlib: BTreeMap<String, Resolved>,
}

impl StaticRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: Resolved) {
        self.packages.insert(entry.name.clone(), entry);
    }

    pub fn insert_stdlib(&mut self, entry: Resolved) {
        self.stdlib.insert(entry.name.clone(), entry);
    }
}

#[async_trait]
impl Registry for StaticRegistry {
    async fn resolve(&self, spec: &PackageSpec) -> Result<Resolved, Error> {
        let mut entry = self
            .packages
            .get(&spec.name)
            .cloned()
            .ok_or_else(|| DepsError::ResolutionFailed {
                package: spec.name.clone(),
                message: "unknown package".to_string(),
            })?;
        // A caller-pinned tree hash always wins.
        if let Some(hash) = spec.tree_hash {
            entry.tree_hash = Some(hash);
        }
        Ok(entry)
    }

    async fn stdlib_resolve(
        &self,
        name: &str,
        _julia_version: Option<&Version>,
    ) -> Result<Resolved, Error> {
        self.stdlib.get(name).cloned().ok_or_else(|| {
            DepsError::StdlibResolutionFailed {
                package: name.to_string(),
                message: "not a known stdlib".to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, deps: &[&str], hash: Option<u8>) -> Resolved {
        Resolved {
            name: name.to_string(),
            version: Some(Version::new(1, 0, 0)),
            tree_hash: hash.map(|b| TreeHash::from_bytes([b; 20])),
            deps: deps.iter().map(|d| (*d).to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn closure_unions_jll_dependencies_to_fixpoint() {
        let mut registry = StaticRegistry::new();
        registry.insert(entry("A_jll", &["B_jll", "NotAnArtifact"], Some(1)));
        registry.insert(entry("B_jll", &["C_jll"], Some(2)));
        registry.insert(entry("C_jll", &[], Some(3)));

        let closure = resolve_closure(&registry, &[PackageSpec::by_name("A_jll")], None)
            .await
            .unwrap();
        let names: Vec<&str> = closure.entries.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["A_jll", "B_jll", "C_jll"]);
        assert!(!closure.stdlib_used);
    }

    #[tokio::test]
    async fn stdlib_entries_resolve_through_the_bypass() {
        let mut registry = StaticRegistry::new();
        registry.insert(entry("Zlib_jll", &[], None));
        registry.insert_stdlib(entry("Zlib_jll", &[], Some(9)));

        let closure = resolve_closure(&registry, &[PackageSpec::by_name("Zlib_jll")], None)
            .await
            .unwrap();
        assert_eq!(
            closure.entries[0].tree_hash,
            Some(TreeHash::from_bytes([9u8; 20]))
        );
        assert!(closure.stdlib_used);
    }

    #[tokio::test]
    async fn unknown_package_fails_resolution() {
        let registry = StaticRegistry::new();
        assert!(
            resolve_closure(&registry, &[PackageSpec::by_name("Nope_jll")], None)
                .await
                .is_err()
        );
    }
}
