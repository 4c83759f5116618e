//! Integration tests for shard selection

use crossforge_hash::TreeHash;
use crossforge_platform::{Arch, CxxStringAbi, Libc, Platform, TargetPlatform};
use crossforge_shards::{
    choose_shards, gcc_builds, select_gcc, ArchiveKind, SelectionPreferences, ShardCatalog,
    ShardName,
};
use crossforge_types::Compiler;
use semver::Version;
use std::collections::BTreeSet;

fn hash(byte: u8) -> TreeHash {
    TreeHash::from_bytes([byte; 20])
}

/// A catalog carrying every GCC build for a handful of targets, plus the
/// usual support shards.
fn full_catalog() -> ShardCatalog {
    let host = "x86_64-linux-musl";
    let rust_host = "x86_64-linux-gnu";
    let targets = [
        "x86_64-linux-musl",
        "x86_64-linux-gnu",
        "aarch64-linux-gnu",
        "x86_64-freebsd",
        "aarch64-macos",
    ];

    let mut entries = Vec::new();
    let mut next = 0u8;
    let mut push = |name: String| {
        next = next.wrapping_add(1);
        entries.push((name, hash(next)));
    };

    push(format!("Rootfs.v2021.8.28.{host}.unpacked"));
    for target in targets {
        push(format!("PlatformSupport-{target}.v2021.8.30.{host}.unpacked"));
        for build in gcc_builds() {
            push(format!("GCCBootstrap-{target}.v{}.{host}.unpacked", build.version));
        }
        push(format!("RustToolchain-{target}.v1.57.0.{rust_host}.unpacked"));
    }
    push(format!("LLVMBootstrap.v12.0.1.{host}.unpacked"));
    push(format!("RustBase.v1.57.0.{rust_host}.unpacked"));
    push(format!("Go.v1.18.0.{host}.unpacked"));

    ShardCatalog::from_entries(entries)
}

fn compilers(list: &[Compiler]) -> BTreeSet<Compiler> {
    list.iter().copied().collect()
}

#[test]
fn empty_compiler_set_selects_rootfs_and_platform_support_only() {
    let catalog = full_catalog();
    let target = Platform::Target(TargetPlatform::linux(Arch::Aarch64, Libc::Glibc));

    let shards = choose_shards(&catalog, &target, &compilers(&[]), &SelectionPreferences::default())
        .unwrap();

    assert_eq!(shards.len(), 2);
    assert_eq!(shards[0].name, ShardName::Rootfs);
    assert_eq!(shards[1].name, ShardName::PlatformSupport);
    assert_eq!(shards[1].target.as_ref().unwrap().aatriplet(), "aarch64-linux-gnu");
}

#[test]
fn adding_a_compiler_never_removes_a_shard() {
    let catalog = full_catalog();
    let target = Platform::Target(TargetPlatform::linux(Arch::Aarch64, Libc::Glibc));
    let prefs = SelectionPreferences::default();

    let base = choose_shards(&catalog, &target, &compilers(&[]), &prefs).unwrap();
    let with_c = choose_shards(&catalog, &target, &compilers(&[Compiler::C]), &prefs).unwrap();
    let with_all = choose_shards(
        &catalog,
        &target,
        &compilers(&[Compiler::C, Compiler::Rust, Compiler::Go]),
        &prefs,
    )
    .unwrap();

    for shard in &base {
        assert!(with_c.contains(shard), "C build dropped {shard}");
    }
    for shard in &with_c {
        assert!(with_all.contains(shard), "full build dropped {shard}");
    }
}

#[test]
fn c_cross_build_carries_host_and_target_toolchains() {
    let catalog = full_catalog();
    let target = Platform::Target(TargetPlatform::linux(Arch::Aarch64, Libc::Glibc));

    let shards = choose_shards(
        &catalog,
        &target,
        &compilers(&[Compiler::C]),
        &SelectionPreferences::default(),
    )
    .unwrap();

    let gcc_targets: Vec<String> = shards
        .iter()
        .filter(|s| s.name == ShardName::GccBootstrap)
        .map(|s| s.target.as_ref().unwrap().aatriplet())
        .collect();
    assert!(gcc_targets.contains(&"aarch64-linux-gnu".to_string()));
    assert!(gcc_targets.contains(&"x86_64-linux-musl".to_string()));
}

#[test]
fn rust_shards_are_hosted_on_glibc() {
    let catalog = full_catalog();
    let target = Platform::Target(TargetPlatform::linux(Arch::Aarch64, Libc::Glibc));

    let shards = choose_shards(
        &catalog,
        &target,
        &compilers(&[Compiler::Rust]),
        &SelectionPreferences::default(),
    )
    .unwrap();

    for shard in shards
        .iter()
        .filter(|s| matches!(s.name, ShardName::RustBase | ShardName::RustToolchain))
    {
        assert_eq!(shard.host.aatriplet(), "x86_64-linux-gnu");
    }

    // Cross target gets the self-targeted toolchain plus one for the
    // musl build host.
    let rust_targets: BTreeSet<String> = shards
        .iter()
        .filter(|s| s.name == ShardName::RustToolchain)
        .map(|s| s.target.as_ref().unwrap().aatriplet())
        .collect();
    assert!(rust_targets.contains("aarch64-linux-gnu"));
    assert!(rust_targets.contains("x86_64-linux-gnu"));
    assert!(rust_targets.contains("x86_64-linux-musl"));
}

#[test]
fn libgfortran3_with_preferred_v8_selects_gcc_6() {
    let catalog = full_catalog();
    let target = TargetPlatform::linux(Arch::X86_64, Libc::Glibc)
        .with_libgfortran_version(Some(Version::new(3, 0, 0)));

    let build = select_gcc(&target, &Version::new(8, 0, 0), &catalog, ArchiveKind::Unpacked)
        .unwrap();
    assert_eq!(build.version, Version::new(6, 1, 0));
}

#[test]
fn carmel_march_forces_gcc_8_minimum() {
    let catalog = full_catalog();
    let target = TargetPlatform::linux(Arch::Aarch64, Libc::Glibc)
        .with_extension("march", "carmel")
        .unwrap();

    let build = select_gcc(&target, &Version::new(5, 0, 0), &catalog, ArchiveKind::Unpacked)
        .unwrap();
    assert_eq!(build.version, Version::new(8, 1, 0));
}

#[test]
fn libstdcxx_constraint_rounds_down() {
    let catalog = full_catalog();
    let target = TargetPlatform::linux(Arch::X86_64, Libc::Glibc)
        .with_libstdcxx_version(Some(Version::new(3, 4, 24)));

    // 3.4.24 sits between GCC 7.1 (3.4.23) and GCC 8.1 (3.4.25); only
    // builds at or below the constraint survive.
    let build = select_gcc(&target, &Version::new(11, 0, 0), &catalog, ArchiveKind::Unpacked)
        .unwrap();
    assert_eq!(build.version, Version::new(7, 1, 0));

    for b in gcc_builds() {
        if b.version <= build.version {
            assert!(b.abi.libstdcxx_version.as_ref().unwrap() <= &Version::new(3, 4, 24));
        }
    }
}

#[test]
fn cxx11_requires_gcc_5() {
    let catalog = full_catalog();
    let target = TargetPlatform::linux(Arch::X86_64, Libc::Glibc)
        .with_cxxstring_abi(Some(CxxStringAbi::Cxx11));

    let build = select_gcc(&target, &Version::new(4, 8, 5), &catalog, ArchiveKind::Unpacked)
        .unwrap();
    assert_eq!(build.version, Version::new(5, 2, 0));
}

#[test]
fn impossible_abi_is_reported() {
    // Catalog with only GCC 4.8.5 cannot satisfy a cxx11 target.
    let entries = [
        ("Rootfs.v2021.8.28.x86_64-linux-musl.unpacked", 1u8),
        (
            "GCCBootstrap-x86_64-linux-gnu.v4.8.5.x86_64-linux-musl.unpacked",
            2,
        ),
        (
            "GCCBootstrap-x86_64-linux-musl.v4.8.5.x86_64-linux-musl.unpacked",
            3,
        ),
    ];
    let catalog = ShardCatalog::from_entries(
        entries
            .into_iter()
            .map(|(name, byte)| (name.to_string(), hash(byte))),
    );

    let target = TargetPlatform::linux(Arch::X86_64, Libc::Glibc)
        .with_cxxstring_abi(Some(CxxStringAbi::Cxx11));
    assert!(select_gcc(&target, &Version::new(9, 0, 0), &catalog, ArchiveKind::Unpacked).is_err());
}

#[test]
fn any_platform_selects_like_the_musl_host() {
    let catalog = full_catalog();
    let prefs = SelectionPreferences::default();

    let any = choose_shards(&catalog, &Platform::Any, &compilers(&[Compiler::C]), &prefs).unwrap();
    let host = choose_shards(
        &catalog,
        &Platform::Target(TargetPlatform::linux(Arch::X86_64, Libc::Musl)),
        &compilers(&[Compiler::C]),
        &prefs,
    )
    .unwrap();
    assert_eq!(any, host);
}

#[test]
fn bootstrap_mode_emits_newest_of_each_name() {
    let entries = [
        ("Rootfs.v2021.8.28.x86_64-linux-musl.squashfs", 1u8),
        ("Rootfs.v2020.1.1.x86_64-linux-musl.squashfs", 2),
        (
            "PlatformSupport-aarch64-linux-gnu.v2021.8.30.x86_64-linux-musl.squashfs",
            3,
        ),
        (
            "PlatformSupport-x86_64-linux-gnu.v2021.8.30.x86_64-linux-musl.squashfs",
            4,
        ),
    ];
    let catalog = ShardCatalog::from_entries(
        entries
            .into_iter()
            .map(|(name, byte)| (name.to_string(), hash(byte))),
    );

    let prefs = SelectionPreferences {
        bootstrap: vec![ShardName::Rootfs, ShardName::PlatformSupport],
        ..SelectionPreferences::default()
    };
    let shards = choose_shards(&catalog, &Platform::Any, &compilers(&[]), &prefs).unwrap();

    let rootfs: Vec<_> = shards.iter().filter(|s| s.name == ShardName::Rootfs).collect();
    assert_eq!(rootfs.len(), 1);
    assert_eq!(rootfs[0].version, Version::new(2021, 8, 28));

    let support: Vec<_> = shards
        .iter()
        .filter(|s| s.name == ShardName::PlatformSupport)
        .collect();
    assert_eq!(support.len(), 2);
}
