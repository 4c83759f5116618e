//! Bazel `cc_toolchain` definitions

use crate::EmitContext;
use std::fmt::Write;

pub(crate) fn render(ctx: &EmitContext) -> String {
    let mut out = String::new();
    let aat = ctx.platform.aatriplet();
    let sysroot = ctx.sysroot();

    let _ = writeln!(out, "# Bazel cc_toolchain for {}", ctx.platform.triplet());
    let _ = writeln!(out, "cc_toolchain(");
    let _ = writeln!(out, "    name = \"cc-toolchain-{aat}\",");
    let _ = writeln!(out, "    toolchain_identifier = \"{aat}\",");
    let _ = writeln!(out, "    target_system_name = \"{aat}\",");
    let _ = writeln!(out, "    builtin_sysroot = \"{sysroot}\",");
    let _ = writeln!(out, "    tool_paths = {{");
    for (bazel_name, tool) in [
        ("gcc", ctx.tool("cc")),
        ("g++", ctx.tool("c++")),
        ("cpp", ctx.tool("cpp")),
        ("ld", ctx.linker()),
        ("ar", ctx.tool("ar")),
        ("nm", ctx.tool("nm")),
        ("objcopy", ctx.tool("objcopy")),
        ("objdump", ctx.tool("objdump")),
        ("strip", ctx.tool("strip")),
    ] {
        let _ = writeln!(out, "        \"{bazel_name}\": \"{tool}\",");
    }
    let _ = writeln!(out, "    }},");

    let _ = writeln!(out, "    cxx_builtin_include_directories = [");
    let _ = writeln!(out, "        \"{sysroot}/usr/include\",");
    if let Some(gcc) = &ctx.opts.gcc_version {
        let _ = writeln!(out, "        \"{sysroot}/usr/include/c++/{}\",", gcc.major);
        let _ = writeln!(
            out,
            "        \"{sysroot}/usr/include/c++/{}/{aat}\",",
            gcc.major
        );
    }
    let _ = writeln!(out, "    ],");
    let _ = writeln!(out, ")");

    out
}
