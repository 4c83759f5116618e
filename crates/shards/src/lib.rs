#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Compiler shard catalog and selection
//!
//! A *shard* is one toolchain fragment (a compiler, a sysroot, a rootfs)
//! packaged as a content-addressed artifact. The catalog decodes the
//! static shard manifest; the selector picks the minimal shard set for a
//! target platform and requested compiler families.

mod catalog;
mod gcc;
mod selector;

pub use catalog::ShardCatalog;
pub use gcc::{gcc_builds, llvm_builds, minimum_gcc_for_march, GccBuild, LlvmBuild};
pub use selector::{build_host, choose_shards, select_gcc, SelectionPreferences};

use crossforge_platform::TargetPlatform;
use semver::Version;
use std::fmt;
use std::str::FromStr;

/// Closed vocabulary of shard kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShardName {
    Rootfs,
    PlatformSupport,
    GccBootstrap,
    LlvmBootstrap,
    RustBase,
    RustToolchain,
    Go,
}

impl ShardName {
    /// Manifest spelling of the shard name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rootfs => "Rootfs",
            Self::PlatformSupport => "PlatformSupport",
            Self::GccBootstrap => "GCCBootstrap",
            Self::LlvmBootstrap => "LLVMBootstrap",
            Self::RustBase => "RustBase",
            Self::RustToolchain => "RustToolchain",
            Self::Go => "Go",
        }
    }
}

impl FromStr for ShardName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Rootfs" => Ok(Self::Rootfs),
            "PlatformSupport" => Ok(Self::PlatformSupport),
            "GCCBootstrap" => Ok(Self::GccBootstrap),
            "LLVMBootstrap" => Ok(Self::LlvmBootstrap),
            "RustBase" => Ok(Self::RustBase),
            "RustToolchain" => Ok(Self::RustToolchain),
            "Go" => Ok(Self::Go),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ShardName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a shard's artifact is materialised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// Plain directory in the artifact store; bind-mounted as-is
    Unpacked,
    /// Squashfs image; loop-mounted under the build root
    Squashfs,
}

impl ArchiveKind {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Unpacked => "unpacked",
            Self::Squashfs => "squashfs",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "unpacked" => Some(Self::Unpacked),
            "squashfs" => Some(Self::Squashfs),
            _ => None,
        }
    }
}

/// One toolchain fragment. Host and target are stored in ABI-agnostic
/// form; ABI decisions happen at selection time, not in shard identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerShard {
    pub name: ShardName,
    pub version: Version,
    pub host: TargetPlatform,
    pub target: Option<TargetPlatform>,
    pub kind: ArchiveKind,
}

impl CompilerShard {
    /// Canonical artifact file name, the inverse of the manifest grammar:
    /// `<name>[-<target>].v<version>.<host>.<ext>`
    #[must_use]
    pub fn artifact_name(&self) -> String {
        let mut out = self.name.as_str().to_string();
        if let Some(target) = &self.target {
            out.push('-');
            out.push_str(&target.aatriplet());
        }
        out.push_str(&format!(
            ".v{}.{}.{}",
            self.version,
            self.host.aatriplet(),
            self.kind.extension()
        ));
        out
    }

    /// Directory name used for mountpoints (artifact name without the
    /// archive extension)
    #[must_use]
    pub fn dir_name(&self) -> String {
        let name = self.artifact_name();
        name.trim_end_matches(self.kind.extension())
            .trim_end_matches('.')
            .to_string()
    }

    /// Whether this shard materialises macOS SDK contents and therefore
    /// requires the Xcode EULA to have been accepted
    #[must_use]
    pub fn is_apple_sdk(&self) -> bool {
        use crossforge_platform::Os;
        self.target
            .as_ref()
            .is_some_and(|t| t.os() == Os::MacOs)
    }
}

impl fmt::Display for CompilerShard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.artifact_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossforge_platform::{Arch, Libc};

    #[test]
    fn artifact_name_round_trips_through_the_catalog_grammar() {
        let shard = CompilerShard {
            name: ShardName::GccBootstrap,
            version: Version::new(9, 1, 0),
            host: TargetPlatform::linux(Arch::X86_64, Libc::Musl),
            target: Some(TargetPlatform::linux(Arch::Aarch64, Libc::Glibc)),
            kind: ArchiveKind::Squashfs,
        };
        assert_eq!(
            shard.artifact_name(),
            "GCCBootstrap-aarch64-linux-gnu.v9.1.0.x86_64-linux-musl.squashfs"
        );
        assert_eq!(
            shard.dir_name(),
            "GCCBootstrap-aarch64-linux-gnu.v9.1.0.x86_64-linux-musl"
        );

        let decoded = ShardCatalog::decode_name(&shard.artifact_name()).unwrap();
        assert_eq!(decoded, shard);
    }

    #[test]
    fn rootfs_has_no_target_component() {
        let shard = CompilerShard {
            name: ShardName::Rootfs,
            version: Version::new(2021, 8, 28),
            host: TargetPlatform::linux(Arch::X86_64, Libc::Musl),
            target: None,
            kind: ArchiveKind::Unpacked,
        };
        assert_eq!(
            shard.artifact_name(),
            "Rootfs.v2021.8.28.x86_64-linux-musl.unpacked"
        );
    }
}
