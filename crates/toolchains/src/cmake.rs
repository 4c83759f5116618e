//! CMake toolchain files
//!
//! `CMAKE_SYSTEM_NAME` is set only on target-role files: its presence is
//! how CMake decides this is a cross build. Host files describe the
//! machine CMake itself runs on and nothing more.

use crate::{system_name, EmitContext, Role};
use crossforge_platform::Os;
use std::fmt::Write;

/// Darwin kernel the macOS sysroots are built against
const DARWIN_VERSION: (u32, u32) = (14, 5);

pub(crate) fn render(ctx: &EmitContext) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# CMake toolchain file for {}", ctx.platform.triplet());
    let _ = writeln!(
        out,
        "set(CMAKE_HOST_SYSTEM_NAME {})",
        system_name(ctx.host.os())
    );
    let _ = writeln!(
        out,
        "set(CMAKE_HOST_SYSTEM_PROCESSOR {})",
        ctx.host.arch().as_str()
    );
    let _ = writeln!(
        out,
        "set(CMAKE_HOST_SYSTEM_VERSION {})",
        ctx.host_kernel
    );

    if ctx.role == Role::Target {
        let _ = writeln!(
            out,
            "set(CMAKE_SYSTEM_NAME {})",
            system_name(ctx.platform.os())
        );
        let _ = writeln!(
            out,
            "set(CMAKE_SYSTEM_PROCESSOR {})",
            ctx.platform.arch().as_str()
        );
    }

    let _ = writeln!(out, "set(CMAKE_SYSROOT {})", ctx.sysroot());

    if ctx.platform.os() == Os::MacOs {
        let _ = writeln!(
            out,
            "set(CMAKE_SYSTEM_FRAMEWORK_PATH\n    {sysroot}/System/Library/Frameworks\n    {sysroot}/System/Library/PrivateFrameworks\n)",
            sysroot = ctx.sysroot()
        );
        let _ = writeln!(out, "set(DARWIN_MAJOR_VERSION {})", DARWIN_VERSION.0);
        let _ = writeln!(out, "set(DARWIN_MINOR_VERSION {})", DARWIN_VERSION.1);
    }

    let _ = writeln!(out, "set(CMAKE_C_COMPILER {})", ctx.tool("cc"));
    let _ = writeln!(out, "set(CMAKE_CXX_COMPILER {})", ctx.tool("c++"));
    let _ = writeln!(out, "set(CMAKE_Fortran_COMPILER {})", ctx.tool("gfortran"));
    let _ = writeln!(out, "set(CMAKE_LINKER {})", ctx.linker());
    let _ = writeln!(out, "set(CMAKE_AR {})", ctx.tool("ar"));
    let _ = writeln!(out, "set(CMAKE_NM {})", ctx.tool("nm"));
    let _ = writeln!(out, "set(CMAKE_RANLIB {})", ctx.tool("ranlib"));
    let _ = writeln!(out, "set(CMAKE_OBJCOPY {})", ctx.tool("objcopy"));

    // The wrappers already honour ccache, but CMake re-resolves
    // compilers; keep the launcher in sync with the environment.
    let _ = writeln!(out, "if(DEFINED ENV{{CC}} AND \"$ENV{{CC}}\" MATCHES \"ccache\")");
    let _ = writeln!(out, "    set(CMAKE_C_COMPILER_LAUNCHER ccache)");
    let _ = writeln!(out, "    set(CMAKE_CXX_COMPILER_LAUNCHER ccache)");
    let _ = writeln!(out, "    set(CMAKE_Fortran_COMPILER_LAUNCHER ccache)");
    let _ = writeln!(out, "endif()");

    out
}
