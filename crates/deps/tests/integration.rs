//! Integration tests for dependency installation

use crossforge_deps::{DepInstaller, Resolved, StaticRegistry};
use crossforge_hash::TreeHash;
use crossforge_platform::{Arch, Libc, TargetPlatform};
use crossforge_store::ArtifactStore;
use crossforge_types::{PackageSpec, Prefix};
use semver::Version;
use std::collections::BTreeSet;
use std::path::Path;
use tokio::fs;

struct Fixture {
    _tmp: tempfile::TempDir,
    store: ArtifactStore,
    prefix: Prefix,
    platform: TargetPlatform,
    registry: StaticRegistry,
}

async fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let platform = TargetPlatform::linux(Arch::X86_64, Libc::Musl);
    let prefix = Prefix::create(&tmp.path().join("build"), &platform, &platform)
        .await
        .unwrap();
    let store = ArtifactStore::new(tmp.path().join("store"));
    Fixture {
        _tmp: tmp,
        store,
        prefix,
        platform,
        registry: StaticRegistry::new(),
    }
}

/// Install an artifact tree into the store and register it under `name`
async fn seed_package(
    fx: &mut Fixture,
    name: &str,
    deps: &[&str],
    files: &[(&str, &[u8])],
) -> TreeHash {
    let dir = fx.store.root().parent().unwrap().join(format!("seed-{name}"));
    for (rel, contents) in files {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, contents).await.unwrap();
    }
    let hash = fx.store.install_from_dir(&dir).await.unwrap();
    fx.registry.insert(Resolved {
        name: name.to_string(),
        version: Some(Version::new(1, 0, 0)),
        tree_hash: Some(hash),
        deps: deps.iter().map(|d| (*d).to_string()).collect(),
    });
    hash
}

async fn destdir_listing(destdir: &Path) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut stack = vec![destdir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(mut entries) = fs::read_dir(&dir).await else {
            continue;
        };
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let path = entry.path();
            let rel = path.strip_prefix(destdir).unwrap().display().to_string();
            let meta = fs::symlink_metadata(&path).await.unwrap();
            if meta.is_dir() {
                stack.push(path.clone());
                out.insert(format!("{rel}/"));
            } else if meta.file_type().is_symlink() {
                let target = fs::read_link(&path).await.unwrap();
                out.insert(format!("{rel} -> {}", target.display()));
            } else {
                out.insert(rel);
            }
        }
    }
    out
}

#[tokio::test]
async fn install_copies_artifacts_and_links_them_into_destdir() {
    let mut fx = fixture().await;
    let hash = seed_package(
        &mut fx,
        "Zlib_jll",
        &[],
        &[("lib/libz.so", b"elf"), ("include/zlib.h", b"#define")],
    )
    .await;

    let installer = DepInstaller::new(&fx.store, &fx.prefix, fx.platform.clone());
    let report = installer
        .install(&fx.registry, &[PackageSpec::by_name("Zlib_jll")])
        .await
        .unwrap();
    assert_eq!(report.resolved.len(), 1);

    // The per-build copy exists and is a real file, not a link.
    let copy = fx.prefix.artifact_dir(&fx.platform, &hash);
    let copy_meta = fs::symlink_metadata(copy.join("lib/libz.so")).await.unwrap();
    assert!(copy_meta.is_file());

    // destdir holds relative symlinks into the per-build copy.
    let destdir = fx.prefix.destdir(&fx.platform);
    let link = destdir.join("lib/libz.so");
    let meta = fs::symlink_metadata(&link).await.unwrap();
    assert!(meta.file_type().is_symlink());
    let target = fs::read_link(&link).await.unwrap();
    assert!(target.is_relative());
    assert_eq!(
        fs::canonicalize(&link).await.unwrap(),
        fs::canonicalize(copy.join("lib/libz.so")).await.unwrap()
    );
}

#[tokio::test]
async fn closure_pulls_in_jll_dependencies() {
    let mut fx = fixture().await;
    seed_package(&mut fx, "Libpng_jll", &["Zlib_jll"], &[("lib/libpng.so", b"png")]).await;
    seed_package(&mut fx, "Zlib_jll", &[], &[("lib/libz.so", b"z")]).await;

    let installer = DepInstaller::new(&fx.store, &fx.prefix, fx.platform.clone());
    let report = installer
        .install(&fx.registry, &[PackageSpec::by_name("Libpng_jll")])
        .await
        .unwrap();

    let names: BTreeSet<&str> = report.resolved.iter().map(|r| r.name.as_str()).collect();
    assert!(names.contains("Zlib_jll"));
    assert!(fx
        .prefix
        .destdir(&fx.platform)
        .join("lib/libz.so")
        .exists());
}

#[tokio::test]
async fn install_is_idempotent_and_cleanup_restores_destdir() {
    let mut fx = fixture().await;
    seed_package(
        &mut fx,
        "Zlib_jll",
        &[],
        &[("lib/libz.so", b"elf"), ("share/doc/README", b"docs")],
    )
    .await;

    let destdir = fx.prefix.destdir(&fx.platform);
    // Pre-existing content from the build itself must survive cleanup.
    fs::create_dir_all(destdir.join("bin")).await.unwrap();
    fs::write(destdir.join("bin/mine"), b"built").await.unwrap();
    let before = destdir_listing(&destdir).await;

    let installer = DepInstaller::new(&fx.store, &fx.prefix, fx.platform.clone());
    let specs = [PackageSpec::by_name("Zlib_jll")];

    installer.install(&fx.registry, &specs).await.unwrap();
    let once = destdir_listing(&destdir).await;
    installer.install(&fx.registry, &specs).await.unwrap();
    let twice = destdir_listing(&destdir).await;
    assert_eq!(once, twice, "second install changed destdir");

    installer.cleanup().await.unwrap();
    let after = destdir_listing(&destdir).await;
    assert_eq!(before, after, "cleanup did not restore destdir");
}

#[tokio::test]
async fn identical_files_from_two_artifacts_are_skipped_silently() {
    let mut fx = fixture().await;
    seed_package(&mut fx, "A_jll", &[], &[("lib/common.so", b"same bytes")]).await;
    seed_package(&mut fx, "B_jll", &[], &[("lib/common.so", b"same bytes")]).await;

    let installer = DepInstaller::new(&fx.store, &fx.prefix, fx.platform.clone());
    installer
        .install(
            &fx.registry,
            &[PackageSpec::by_name("A_jll"), PackageSpec::by_name("B_jll")],
        )
        .await
        .unwrap();

    let link = fx.prefix.destdir(&fx.platform).join("lib/common.so");
    assert!(fs::symlink_metadata(&link).await.unwrap().file_type().is_symlink());
}

#[tokio::test]
async fn conflicting_files_keep_the_first_owner() {
    let mut fx = fixture().await;
    seed_package(&mut fx, "A_jll", &[], &[("lib/clash.so", b"from A")]).await;
    seed_package(&mut fx, "B_jll", &[], &[("lib/clash.so", b"from B, different")]).await;

    let installer = DepInstaller::new(&fx.store, &fx.prefix, fx.platform.clone());
    installer
        .install(
            &fx.registry,
            &[PackageSpec::by_name("A_jll"), PackageSpec::by_name("B_jll")],
        )
        .await
        .unwrap();

    let link = fx.prefix.destdir(&fx.platform).join("lib/clash.so");
    let resolved = fs::read(fs::canonicalize(&link).await.unwrap()).await.unwrap();
    assert_eq!(resolved, b"from A");
}

#[tokio::test]
async fn missing_store_artifact_is_reported() {
    let mut fx = fixture().await;
    fx.registry.insert(Resolved {
        name: "Ghost_jll".to_string(),
        version: Some(Version::new(1, 0, 0)),
        tree_hash: Some(TreeHash::from_bytes([42u8; 20])),
        deps: Vec::new(),
    });

    let installer = DepInstaller::new(&fx.store, &fx.prefix, fx.platform.clone());
    assert!(installer
        .install(&fx.registry, &[PackageSpec::by_name("Ghost_jll")])
        .await
        .is_err());
}
