//! Cargo configuration: linker bindings per Rust target triple

use crossforge_errors::Error;
use crossforge_platform::{Arch, CallAbi, Libc, Os, TargetPlatform};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// The Rust target triple for an ABI-agnostic platform
#[must_use]
pub fn rust_target_triple(platform: &TargetPlatform) -> String {
    let arch = match platform.arch() {
        Arch::I686 => "i686",
        Arch::X86_64 => "x86_64",
        Arch::Armv7l => "armv7",
        Arch::Aarch64 => "aarch64",
        Arch::Powerpc64le => "powerpc64le",
    };

    match platform.os() {
        Os::Linux => {
            let libc = match platform.libc() {
                Some(Libc::Musl) => "musl",
                _ => "gnu",
            };
            let abi = match platform.call_abi() {
                Some(CallAbi::Eabihf) => "eabihf",
                None => "",
            };
            format!("{arch}-unknown-linux-{libc}{abi}")
        }
        Os::MacOs => format!("{arch}-apple-darwin"),
        Os::FreeBsd => format!("{arch}-unknown-freebsd"),
        Os::Windows => format!("{arch}-pc-windows-gnu"),
    }
}

#[derive(Serialize)]
struct TargetEntry {
    linker: String,
}

#[derive(Serialize)]
struct CargoConfig {
    target: BTreeMap<String, TargetEntry>,
}

/// Write `config.toml` with one `[target.<triple>]` block per platform,
/// each pinning the wrapped C compiler as the linker.
///
/// # Errors
///
/// Returns an error if serialisation or the write fails.
pub(crate) async fn write_config(
    dir: &Path,
    platforms: &[&TargetPlatform],
) -> Result<PathBuf, Error> {
    let mut target = BTreeMap::new();
    for platform in platforms {
        target.insert(
            rust_target_triple(&platform.abi_agnostic()),
            TargetEntry {
                linker: format!("{}-cc", platform.aatriplet()),
            },
        );
    }

    let body = toml::to_string_pretty(&CargoConfig { target })
        .map_err(|e| Error::internal(format!("cargo config serialisation failed: {e}")))?;
    let path = dir.join("config.toml");
    fs::write(&path, body)
        .await
        .map_err(|e| Error::io_with_path(&e, &path))?;
    Ok(path)
}
