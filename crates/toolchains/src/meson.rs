//! Meson cross and native files

use crate::{EmitContext, Role};
use crossforge_platform::{Arch, Libc, Os, TargetPlatform};
use std::fmt::Write;

/// Meson's `cpu_family` names differ from triplet spellings
pub(crate) fn cpu_family(arch: Arch) -> &'static str {
    match arch {
        Arch::Powerpc64le => "ppc64",
        Arch::I686 => "x86",
        Arch::Armv7l => "arm",
        Arch::X86_64 => "x86_64",
        Arch::Aarch64 => "aarch64",
    }
}

fn system(os: Os) -> &'static str {
    match os {
        Os::Linux => "linux",
        Os::MacOs => "darwin",
        Os::FreeBsd => "freebsd",
        Os::Windows => "windows",
    }
}

/// The musl build host can directly execute binaries for these targets,
/// so no exe wrapper is needed for them.
fn runnable_on_host(platform: &TargetPlatform) -> bool {
    if platform.os() != Os::Linux {
        return false;
    }
    matches!(
        (platform.arch(), platform.libc()),
        (Arch::I686, Some(Libc::Glibc)) | (Arch::X86_64, Some(Libc::Glibc | Libc::Musl))
    )
}

pub(crate) fn render(ctx: &EmitContext) -> String {
    let mut out = String::new();
    let platform = &ctx.platform;

    let _ = writeln!(out, "[binaries]");
    let _ = writeln!(out, "c = '{}'", ctx.tool("cc"));
    let _ = writeln!(out, "cpp = '{}'", ctx.tool("c++"));
    let _ = writeln!(out, "fortran = '{}'", ctx.tool("gfortran"));
    let _ = writeln!(out, "ar = '{}'", ctx.tool("ar"));
    let _ = writeln!(out, "ld = '{}'", ctx.linker());
    let _ = writeln!(out, "nm = '{}'", ctx.tool("nm"));
    let _ = writeln!(out, "ranlib = '{}'", ctx.tool("ranlib"));
    let _ = writeln!(out, "objcopy = '{}'", ctx.tool("objcopy"));
    let _ = writeln!(out, "strip = '{}'", ctx.tool("strip"));
    let _ = writeln!(out, "pkgconfig = 'pkg-config'");

    let _ = writeln!(out, "\n[built-in options]");
    let _ = writeln!(out, "prefix = '/workspace/destdir'");

    let _ = writeln!(out, "\n[properties]");
    let _ = writeln!(out, "sys_root = '{}'", ctx.sysroot());
    let _ = writeln!(
        out,
        "needs_exe_wrapper = {}",
        if runnable_on_host(platform) { "false" } else { "true" }
    );

    let _ = writeln!(out, "\n[build_machine]");
    let _ = writeln!(out, "system = '{}'", system(ctx.host.os()));
    let _ = writeln!(out, "cpu_family = '{}'", cpu_family(ctx.host.arch()));
    let _ = writeln!(out, "cpu = '{}'", ctx.host.arch().as_str());
    let _ = writeln!(out, "endian = 'little'");

    if ctx.role == Role::Target {
        let _ = writeln!(out, "\n[host_machine]");
        let _ = writeln!(out, "system = '{}'", system(platform.os()));
        let _ = writeln!(out, "cpu_family = '{}'", cpu_family(platform.arch()));
        let _ = writeln!(out, "cpu = '{}'", platform.arch().as_str());
        let _ = writeln!(out, "endian = 'little'");
    }

    out
}
