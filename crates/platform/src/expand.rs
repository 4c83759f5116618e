//! Platform expansion: ABI variants and microarchitectures

use crate::{Arch, CxxStringAbi, Os, Platform, TargetPlatform};
use semver::Version;

/// Supported microarchitecture tags per architecture. The first entry is
/// the baseline the architecture name itself denotes.
pub const MICROARCHITECTURES: &[(Arch, &[&str])] = &[
    (Arch::X86_64, &["x86_64", "avx", "avx2", "avx512"]),
    (Arch::Aarch64, &["armv8", "carmel", "thunderx2"]),
    (Arch::Armv7l, &["armv7l", "neon", "vfp4"]),
];

pub(crate) fn marches(arch: Arch) -> &'static [&'static str] {
    MICROARCHITECTURES
        .iter()
        .find(|(a, _)| *a == arch)
        .map_or(&[], |(_, m)| m)
}

pub(crate) fn march_known(arch: Arch, march: &str) -> bool {
    marches(arch).contains(&march)
}

fn with_march(p: &TargetPlatform, march: &str) -> TargetPlatform {
    let mut q = p.clone();
    q.extensions.insert("march".to_string(), march.to_string());
    q
}

/// Expand a platform into one variant per supported microarchitecture.
///
/// A platform already carrying `march`, or whose architecture has no
/// microarchitecture table, expands to itself.
#[must_use]
pub fn expand_microarchitectures(p: &Platform) -> Vec<Platform> {
    let Platform::Target(t) = p else {
        return vec![p.clone()];
    };
    if t.march().is_some() {
        return vec![p.clone()];
    }
    let marches = marches(t.arch());
    if marches.is_empty() {
        return vec![p.clone()];
    }
    marches
        .iter()
        .map(|march| Platform::Target(with_march(t, march)))
        .collect()
}

/// Expand an unspecified libgfortran constraint into versions 3, 4 and 5
#[must_use]
pub fn expand_gfortran_versions(p: &Platform) -> Vec<Platform> {
    let Platform::Target(t) = p else {
        return vec![p.clone()];
    };
    if t.abi().libgfortran_version.is_some() {
        return vec![p.clone()];
    }
    [3, 4, 5]
        .into_iter()
        .map(|major| Platform::Target(t.with_libgfortran_version(Some(Version::new(major, 0, 0)))))
        .collect()
}

/// Expand an unspecified C++ string ABI into cxx03 and cxx11 variants.
///
/// With `skip_freebsd_macos` set (the usual mode), FreeBSD and macOS
/// platforms are left alone; their system libc++ has a single string ABI.
#[must_use]
pub fn expand_cxxstring_abis(p: &Platform, skip_freebsd_macos: bool) -> Vec<Platform> {
    let Platform::Target(t) = p else {
        return vec![p.clone()];
    };
    if t.abi().cxxstring_abi.is_some()
        || (skip_freebsd_macos && matches!(t.os(), Os::FreeBsd | Os::MacOs))
    {
        return vec![p.clone()];
    }
    [CxxStringAbi::Cxx03, CxxStringAbi::Cxx11]
        .into_iter()
        .map(|abi| Platform::Target(t.with_cxxstring_abi(Some(abi))))
        .collect()
}

/// Classify a host CPU feature set into the coarsest x86_64
/// microarchitecture that still fits, and tag the platform with it.
///
/// Non-x86_64 platforms and platforms already carrying `march` are
/// returned unchanged.
#[must_use]
pub fn extended_platform_key_abi<S: AsRef<str>>(
    p: &TargetPlatform,
    cpu_features: &[S],
) -> TargetPlatform {
    if p.arch() != Arch::X86_64 || p.march().is_some() {
        return p.clone();
    }

    let has = |name: &str| {
        cpu_features
            .iter()
            .any(|f| f.as_ref().eq_ignore_ascii_case(name))
    };

    let march = if has("avx512f") {
        "avx512"
    } else if has("avx2") {
        "avx2"
    } else if has("avx") {
        "avx"
    } else {
        "x86_64"
    };

    with_march(p, march)
}
