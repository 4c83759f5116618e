//! Shard selection: the minimal toolchain set for a build
//!
//! Every build environment runs on the x86_64-linux-musl host rootfs.
//! The Rust shards are the one exception and are hosted on glibc
//! ("Rust is broken on musl"; do not change without evidence).

use crate::{ArchiveKind, CompilerShard, GccBuild, ShardCatalog, ShardName};
use crate::gcc::{gcc_builds, llvm_builds, minimum_gcc_for_march};
use crossforge_errors::{Error, ShardError};
use crossforge_platform::{Arch, Libc, Platform, TargetPlatform};
use crossforge_types::Compiler;
use semver::Version;
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// Knobs the caller may turn on shard selection
#[derive(Debug, Clone)]
pub struct SelectionPreferences {
    pub gcc: Version,
    pub llvm: Version,
    pub archive_kind: ArchiveKind,
    /// Non-empty switches to bootstrap mode: emit the newest shard of
    /// each listed name for every target it exists for.
    pub bootstrap: Vec<ShardName>,
}

impl Default for SelectionPreferences {
    fn default() -> Self {
        Self {
            // Oldest GCC maximises compatibility of produced binaries.
            gcc: gcc_builds()[0].version.clone(),
            llvm: llvm_builds()
                .last()
                .expect("LLVM build table is non-empty")
                .version
                .clone(),
            archive_kind: ArchiveKind::Unpacked,
            bootstrap: Vec::new(),
        }
    }
}

/// The rootfs host every sandbox runs as
#[must_use]
pub fn build_host() -> TargetPlatform {
    TargetPlatform::linux(Arch::X86_64, Libc::Musl)
}

fn rust_host() -> TargetPlatform {
    TargetPlatform::linux(Arch::X86_64, Libc::Glibc)
}

/// Choose the shard set for building `target` with the given compiler
/// families.
///
/// # Errors
///
/// Returns [`ShardError::ImpossibleAbi`] when no GCC build satisfies the
/// target's ABI constraints, and [`ShardError::Unregistered`] when a
/// required shard is absent from the catalog.
pub fn choose_shards(
    catalog: &ShardCatalog,
    target: &Platform,
    compilers: &BTreeSet<Compiler>,
    prefs: &SelectionPreferences,
) -> Result<Vec<CompilerShard>, Error> {
    if !prefs.bootstrap.is_empty() {
        return bootstrap_shards(catalog, &prefs.bootstrap);
    }

    let target = target.build_envify().abi_agnostic();
    let host = build_host();
    let kind = prefs.archive_kind;
    let mut out = Vec::new();

    out.push(find(catalog, ShardName::Rootfs, &host, None, kind, Pick::Newest)?);
    out.push(find(
        catalog,
        ShardName::PlatformSupport,
        &host,
        Some(&target),
        kind,
        Pick::Newest,
    )?);

    if compilers.contains(&Compiler::C) {
        let gcc = select_gcc(&target, &prefs.gcc, catalog, kind)?;
        out.push(find(
            catalog,
            ShardName::GccBootstrap,
            &host,
            Some(&target),
            kind,
            Pick::Exact(&gcc.version),
        )?);
        out.push(find(
            catalog,
            ShardName::LlvmBootstrap,
            &host,
            None,
            kind,
            Pick::Nearest(&prefs.llvm),
        )?);

        // Cross builds also get the host-targeted toolchain so build
        // scripts can run host tools.
        if target != host {
            out.push(find(
                catalog,
                ShardName::PlatformSupport,
                &host,
                Some(&host),
                kind,
                Pick::Newest,
            )?);
            out.push(find(
                catalog,
                ShardName::GccBootstrap,
                &host,
                Some(&host),
                kind,
                Pick::Exact(&gcc.version),
            )?);
        }
    }

    if compilers.contains(&Compiler::Rust) {
        let rust_host = rust_host();
        let base = find(catalog, ShardName::RustBase, &rust_host, None, kind, Pick::Newest)?;
        let rust_version = base.version.clone();
        out.push(base);
        out.push(find(
            catalog,
            ShardName::RustToolchain,
            &rust_host,
            Some(&target),
            kind,
            Pick::Exact(&rust_version),
        )?);

        if target != rust_host {
            // Rust probes its own host libraries, so the self-targeted
            // toolchain must be present alongside the cross one.
            out.push(find(
                catalog,
                ShardName::RustToolchain,
                &rust_host,
                Some(&rust_host),
                kind,
                Pick::Exact(&rust_version),
            )?);
            out.push(find(
                catalog,
                ShardName::PlatformSupport,
                &host,
                Some(&rust_host),
                kind,
                Pick::Newest,
            )?);
            out.push(find(
                catalog,
                ShardName::GccBootstrap,
                &host,
                Some(&rust_host),
                kind,
                Pick::Newest,
            )?);
        }
        if target != host {
            out.push(find(
                catalog,
                ShardName::RustToolchain,
                &rust_host,
                Some(&host),
                kind,
                Pick::Exact(&rust_version),
            )?);
        }
    }

    if compilers.contains(&Compiler::Go) {
        out.push(find(catalog, ShardName::Go, &host, None, kind, Pick::Newest)?);
    }

    dedup(&mut out);
    Ok(out)
}

/// Pick the GCC build for a target's ABI constraints
///
/// # Errors
///
/// Returns [`ShardError::ImpossibleAbi`] if no build in the catalog
/// satisfies every constraint.
pub fn select_gcc(
    target: &TargetPlatform,
    preferred: &Version,
    catalog: &ShardCatalog,
    kind: ArchiveKind,
) -> Result<GccBuild, Error> {
    let host = build_host();
    let target_aa = target.abi_agnostic();

    let available = |version: &Version| {
        let has = |tgt: &TargetPlatform| {
            find(
                catalog,
                ShardName::GccBootstrap,
                &host,
                Some(tgt),
                kind,
                Pick::Exact(version),
            )
            .is_ok()
        };
        has(&target_aa) && has(&host)
    };

    let survivors: Vec<&GccBuild> = gcc_builds()
        .iter()
        .filter(|b| available(&b.version))
        .filter(|b| {
            // Exact match: libgfortran's ABI changes with its soversion.
            target.abi().libgfortran_version.as_ref().is_none_or(|want| {
                b.abi.libgfortran_version.as_ref() == Some(want)
            })
        })
        .filter(|b| {
            // Round down: binaries built against an older libstdc++ run
            // on a newer one, not vice versa.
            target.abi().libstdcxx_version.as_ref().is_none_or(|want| {
                b.abi.libstdcxx_version.as_ref().is_some_and(|got| got <= want)
            })
        })
        .filter(|b| {
            use crossforge_platform::CxxStringAbi;
            target.abi().cxxstring_abi != Some(CxxStringAbi::Cxx11)
                || b.version >= Version::new(5, 0, 0)
        })
        .filter(|b| {
            target
                .march()
                .and_then(minimum_gcc_for_march)
                .is_none_or(|min| b.version >= min)
        })
        .collect();

    survivors
        .into_iter()
        .min_by_key(|b| (l1_distance(&b.version, preferred), Reverse(b.version.clone())))
        .cloned()
        .ok_or_else(|| {
            ShardError::ImpossibleAbi {
                triplet: target.triplet(),
                message: format!("no GCC build matches the requested ABI (preferred v{preferred})"),
            }
            .into()
        })
}

fn l1_distance(a: &Version, b: &Version) -> u64 {
    a.major.abs_diff(b.major) + a.minor.abs_diff(b.minor) + a.patch.abs_diff(b.patch)
}

enum Pick<'a> {
    Newest,
    Exact(&'a Version),
    Nearest(&'a Version),
}

fn find(
    catalog: &ShardCatalog,
    name: ShardName,
    host: &TargetPlatform,
    target: Option<&TargetPlatform>,
    kind: ArchiveKind,
    pick: Pick<'_>,
) -> Result<CompilerShard, Error> {
    let matching = |want_kind: ArchiveKind| {
        catalog.all().iter().filter(move |s| {
            s.name == name
                && s.host == *host
                && s.target.as_ref() == target
                && s.kind == want_kind
        })
    };

    // Prefer the requested archive kind, fall back to whatever exists.
    let other = match kind {
        ArchiveKind::Unpacked => ArchiveKind::Squashfs,
        ArchiveKind::Squashfs => ArchiveKind::Unpacked,
    };
    let candidates: Vec<&CompilerShard> = {
        let preferred: Vec<&CompilerShard> = matching(kind).collect();
        if preferred.is_empty() {
            matching(other).collect()
        } else {
            preferred
        }
    };

    let chosen = match pick {
        Pick::Newest => candidates.into_iter().max_by_key(|s| s.version.clone()),
        Pick::Exact(version) => candidates.into_iter().find(|s| s.version == *version),
        Pick::Nearest(version) => candidates
            .into_iter()
            .min_by_key(|s| (l1_distance(&s.version, version), Reverse(s.version.clone()))),
    };

    chosen.cloned().ok_or_else(|| {
        let describe = CompilerShard {
            name,
            version: Version::new(0, 0, 0),
            host: host.clone(),
            target: target.cloned(),
            kind,
        };
        ShardError::Unregistered {
            name: describe.artifact_name(),
        }
        .into()
    })
}

fn bootstrap_shards(
    catalog: &ShardCatalog,
    names: &[ShardName],
) -> Result<Vec<CompilerShard>, Error> {
    let mut out = Vec::new();

    for &name in names {
        let targets: BTreeSet<Option<String>> = catalog
            .all()
            .iter()
            .filter(|s| s.name == name)
            .map(|s| s.target.as_ref().map(TargetPlatform::aatriplet))
            .collect();

        if targets.is_empty() {
            return Err(ShardError::Unregistered {
                name: name.as_str().to_string(),
            }
            .into());
        }

        for target in targets {
            let newest = catalog
                .all()
                .iter()
                .filter(|s| {
                    s.name == name
                        && s.target.as_ref().map(TargetPlatform::aatriplet) == target
                })
                .max_by_key(|s| s.version.clone());
            if let Some(shard) = newest {
                out.push(shard.clone());
            }
        }
    }

    dedup(&mut out);
    Ok(out)
}

fn dedup(shards: &mut Vec<CompilerShard>) {
    let mut seen = BTreeSet::new();
    shards.retain(|s| seen.insert(s.artifact_name()));
}
