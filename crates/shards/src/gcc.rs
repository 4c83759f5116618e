//! Static toolchain build tables
//!
//! One entry per GCC build we ship, recording the ABI that build
//! produces. This table is the source of truth for mapping a target's
//! ABI constraints back to a concrete toolchain.

use crossforge_platform::{CompilerAbi, CxxStringAbi};
use semver::Version;
use std::sync::LazyLock;

/// One available GCC build and the ABI its output carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GccBuild {
    pub version: Version,
    pub abi: CompilerAbi,
}

/// One available LLVM build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlvmBuild {
    pub version: Version,
}

fn gcc(version: (u64, u64, u64), libgfortran: u64, libstdcxx: (u64, u64, u64), cxx11: bool) -> GccBuild {
    GccBuild {
        version: Version::new(version.0, version.1, version.2),
        abi: CompilerAbi {
            libgfortran_version: Some(Version::new(libgfortran, 0, 0)),
            libstdcxx_version: Some(Version::new(libstdcxx.0, libstdcxx.1, libstdcxx.2)),
            cxxstring_abi: Some(if cxx11 {
                CxxStringAbi::Cxx11
            } else {
                CxxStringAbi::Cxx03
            }),
        },
    }
}

static GCC_BUILDS: LazyLock<Vec<GccBuild>> = LazyLock::new(|| {
    vec![
        gcc((4, 8, 5), 3, (3, 4, 19), false),
        gcc((5, 2, 0), 3, (3, 4, 21), true),
        gcc((6, 1, 0), 3, (3, 4, 22), true),
        gcc((7, 1, 0), 4, (3, 4, 23), true),
        gcc((8, 1, 0), 5, (3, 4, 25), true),
        gcc((9, 1, 0), 5, (3, 4, 26), true),
        gcc((10, 2, 0), 5, (3, 4, 28), true),
        gcc((11, 1, 0), 5, (3, 4, 29), true),
    ]
});

static LLVM_BUILDS: LazyLock<Vec<LlvmBuild>> = LazyLock::new(|| {
    [(9, 0, 1), (11, 0, 1), (12, 0, 1), (13, 0, 1)]
        .into_iter()
        .map(|(major, minor, patch)| LlvmBuild {
            version: Version::new(major, minor, patch),
        })
        .collect()
});

/// All GCC builds, oldest first
#[must_use]
pub fn gcc_builds() -> &'static [GccBuild] {
    &GCC_BUILDS
}

/// All LLVM builds, oldest first
#[must_use]
pub fn llvm_builds() -> &'static [LlvmBuild] {
    &LLVM_BUILDS
}

/// The minimum GCC version that can target a microarchitecture, if that
/// microarchitecture constrains the choice at all
#[must_use]
pub fn minimum_gcc_for_march(march: &str) -> Option<Version> {
    match march {
        "avx" | "avx2" => Some(Version::new(4, 9, 0)),
        "avx512" => Some(Version::new(6, 1, 0)),
        "thunderx2" => Some(Version::new(7, 1, 0)),
        // arm v8 SIMD variants landed usably in GCC 8
        "neon" | "vfp4" | "carmel" => Some(Version::new(8, 1, 0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_and_abi_complete() {
        let builds = gcc_builds();
        for pair in builds.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
        for build in builds {
            assert!(build.abi.libgfortran_version.is_some());
            assert!(build.abi.libstdcxx_version.is_some());
            assert!(build.abi.cxxstring_abi.is_some());
        }
    }

    #[test]
    fn only_the_oldest_build_is_cxx03() {
        let builds = gcc_builds();
        assert_eq!(builds[0].abi.cxxstring_abi, Some(CxxStringAbi::Cxx03));
        assert!(builds[1..]
            .iter()
            .all(|b| b.abi.cxxstring_abi == Some(CxxStringAbi::Cxx11)));
    }

    #[test]
    fn march_gates() {
        assert_eq!(minimum_gcc_for_march("avx2"), Some(Version::new(4, 9, 0)));
        assert_eq!(minimum_gcc_for_march("avx512"), Some(Version::new(6, 1, 0)));
        assert_eq!(minimum_gcc_for_march("carmel"), Some(Version::new(8, 1, 0)));
        assert_eq!(minimum_gcc_for_march("x86_64"), None);
        assert_eq!(minimum_gcc_for_march("armv8"), None);
    }
}
