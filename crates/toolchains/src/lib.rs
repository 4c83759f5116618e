#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Toolchain file emission
//!
//! Writes the CMake/Meson/Bazel configuration files and the Cargo config
//! that make the sandbox's wrapped cross-compilers look native to each
//! build system. One file is emitted per `(platform, role, frontend,
//! compiler)` combination, plus a `host_`/`target_` symlink selecting the
//! preferred compiler for the platform.

mod bazel;
mod cargo;
mod cmake;
mod meson;

pub use cargo::rust_target_triple;

use crossforge_errors::Error;
use crossforge_platform::{Os, TargetPlatform};
use crossforge_types::Prefix;
use semver::Version;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Whether a file describes the build's host tools or its cross target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Target,
}

impl Role {
    fn prefix(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Target => "target",
        }
    }
}

/// Compiler families a toolchain file can bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerFlavor {
    Gcc,
    Clang,
}

impl CompilerFlavor {
    fn suffix(self) -> &'static str {
        match self {
            Self::Gcc => "gcc",
            Self::Clang => "clang",
        }
    }
}

/// Emission knobs
#[derive(Debug, Clone, Default)]
pub struct ToolchainOptions {
    /// Use lld (`ld.lld`, `ld64.lld` on macOS) as the linker for Clang
    /// toolchain files
    pub clang_use_lld: bool,
    /// GCC build chosen for this target; pins the libstdc++ header path
    /// in the Bazel toolchain
    pub gcc_version: Option<Version>,
}

/// Everything the per-frontend emitters need to know about one platform
#[derive(Debug, Clone)]
pub(crate) struct EmitContext {
    pub platform: TargetPlatform,
    pub host: TargetPlatform,
    pub role: Role,
    pub flavor: CompilerFlavor,
    pub opts: ToolchainOptions,
    pub host_kernel: String,
}

impl EmitContext {
    /// `/opt/bin/<full-triplet>`, the wrapped tool directory
    pub fn bin_dir(&self) -> String {
        format!("/opt/bin/{}", self.platform.triplet())
    }

    /// `/opt/bin/<full-triplet>/<aatriplet>-<tool>`
    pub fn tool(&self, tool: &str) -> String {
        format!("{}/{}-{tool}", self.bin_dir(), self.platform.aatriplet())
    }

    /// `/opt/<aat>/<aat>/sys-root`
    pub fn sysroot(&self) -> String {
        let aat = self.platform.aatriplet();
        format!("/opt/{aat}/{aat}/sys-root")
    }

    /// GCC toolchains link through the wrapped binutils `ld`; Clang does
    /// too unless lld was requested.
    pub fn linker(&self) -> String {
        match self.flavor {
            CompilerFlavor::Gcc => self.tool("ld"),
            CompilerFlavor::Clang => {
                if self.opts.clang_use_lld {
                    let lld = if self.platform.os() == Os::MacOs {
                        "ld64.lld"
                    } else {
                        "ld.lld"
                    };
                    format!("{}/{lld}", self.bin_dir())
                } else {
                    self.tool("ld")
                }
            }
        }
    }
}

/// Clang is the system compiler on FreeBSD and macOS; GCC everywhere else
#[must_use]
pub fn preferred_flavor(platform: &TargetPlatform) -> CompilerFlavor {
    match platform.os() {
        Os::FreeBsd | Os::MacOs => CompilerFlavor::Clang,
        Os::Linux | Os::Windows => CompilerFlavor::Gcc,
    }
}

/// Emit every toolchain file for a build, one directory per platform
/// triplet under `<prefix>/metadir/toolchains/<triplet>/`, plus the
/// shared Cargo config at the toolchains root. Returns the written
/// paths.
///
/// # Errors
///
/// Returns an error if any file or symlink cannot be written.
pub async fn write_toolchain_files(
    prefix: &Prefix,
    target: &TargetPlatform,
    host: &TargetPlatform,
    opts: &ToolchainOptions,
) -> Result<Vec<PathBuf>, Error> {
    let root = prefix.metadir().join("toolchains");
    let host_kernel = host_kernel_version().await;
    let mut written = Vec::new();

    for (platform, role) in [(host, Role::Host), (target, Role::Target)] {
        let dir = root.join(platform.triplet());
        fs::create_dir_all(&dir).await?;

        for flavor in [CompilerFlavor::Gcc, CompilerFlavor::Clang] {
            let ctx = EmitContext {
                platform: platform.clone(),
                host: host.clone(),
                role,
                flavor,
                opts: opts.clone(),
                host_kernel: host_kernel.clone(),
            };
            written.push(emit(&dir, &ctx, "cmake", &cmake::render(&ctx)).await?);
            written.push(emit(&dir, &ctx, "meson", &meson::render(&ctx)).await?);
            written.push(emit(&dir, &ctx, "bzl", &bazel::render(&ctx)).await?);
        }
        for ext in ["cmake", "meson", "bzl"] {
            written.push(alias(&dir, platform, role, ext).await?);
        }
    }

    written.push(cargo::write_config(&root, &[target, host]).await?);
    Ok(written)
}

fn file_name(platform: &TargetPlatform, role: Role, flavor: CompilerFlavor, ext: &str) -> String {
    format!(
        "{}_{}_{}.{ext}",
        role.prefix(),
        platform.aatriplet(),
        flavor.suffix()
    )
}

async fn emit(
    dir: &Path,
    ctx: &EmitContext,
    ext: &str,
    contents: &str,
) -> Result<PathBuf, Error> {
    let path = dir.join(file_name(&ctx.platform, ctx.role, ctx.flavor, ext));
    fs::write(&path, contents)
        .await
        .map_err(|e| Error::io_with_path(&e, &path))?;
    Ok(path)
}

/// `host_<aat>.<ext>` / `target_<aat>.<ext>` pointing at the preferred
/// compiler's variant
async fn alias(
    dir: &Path,
    platform: &TargetPlatform,
    role: Role,
    ext: &str,
) -> Result<PathBuf, Error> {
    let link = dir.join(format!("{}_{}.{ext}", role.prefix(), platform.aatriplet()));
    let dest = file_name(platform, role, preferred_flavor(platform), ext);
    if fs::symlink_metadata(&link).await.is_ok() {
        fs::remove_file(&link).await?;
    }
    fs::symlink(&dest, &link)
        .await
        .map_err(|e| Error::io_with_path(&e, &link))?;
    Ok(link)
}

async fn host_kernel_version() -> String {
    let output = tokio::process::Command::new("uname").arg("-r").output().await;
    match output {
        Ok(out) if out.status.success() => {
            String::from_utf8_lossy(&out.stdout).trim().to_string()
        }
        _ => "0.0.0".to_string(),
    }
}

pub(crate) fn system_name(os: Os) -> &'static str {
    match os {
        Os::Linux => "Linux",
        Os::MacOs => "Darwin",
        Os::FreeBsd => "FreeBSD",
        Os::Windows => "Windows",
    }
}
