//! Integration tests for source staging

use crossforge_hash::Sha256;
use crossforge_platform::{Arch, Libc, TargetPlatform};
use crossforge_sources::{stage_all, Source};
use crossforge_types::Prefix;
use tokio::fs;

async fn make_prefix(root: &std::path::Path) -> Prefix {
    let host = TargetPlatform::linux(Arch::X86_64, Libc::Musl);
    Prefix::create(&root.join("build"), &host, &host).await.unwrap()
}

#[tokio::test]
async fn file_source_verifies_and_copies() {
    let tmp = tempfile::tempdir().unwrap();
    let prefix = make_prefix(tmp.path()).await;

    let payload = b"configure script";
    let file = tmp.path().join("configure");
    fs::write(&file, payload).await.unwrap();

    let source = Source::File {
        path: file.clone(),
        sha256: Sha256::from_data(payload),
    };
    let staged = source.stage(&prefix).await.unwrap();
    assert_eq!(staged.path, prefix.srcdir().join("configure"));
    assert_eq!(fs::read(&staged.path).await.unwrap(), payload);

    // Wrong pin refuses to stage.
    let bad = Source::File {
        path: file,
        sha256: Sha256::from_data(b"something else"),
    };
    assert!(bad.stage(&prefix).await.is_err());
}

#[tokio::test]
async fn directory_source_copies_contents() {
    let tmp = tempfile::tempdir().unwrap();
    let prefix = make_prefix(tmp.path()).await;

    let dir = tmp.path().join("vendor");
    fs::create_dir_all(dir.join("sub")).await.unwrap();
    fs::write(dir.join("sub/data.c"), b"int main(){}").await.unwrap();

    let source = Source::Directory {
        path: dir,
        follow_symlinks: false,
    };
    let staged = source.stage(&prefix).await.unwrap();
    assert_eq!(staged.target, "vendor");
    assert!(staged.path.join("sub/data.c").exists());
}

#[tokio::test]
async fn patch_source_lands_under_patches() {
    let tmp = tempfile::tempdir().unwrap();
    let prefix = make_prefix(tmp.path()).await;

    let source = Source::Patch {
        name: "0001-fix-cross.patch".to_string(),
        payload: "--- a/x\n+++ b/x\n".to_string(),
    };
    let staged = source.stage(&prefix).await.unwrap();
    assert_eq!(
        staged.path,
        prefix.patches_dir().join("0001-fix-cross.patch")
    );
    assert!(staged.path.exists());
}

#[tokio::test]
async fn archive_source_extracts_with_host_tar() {
    let tmp = tempfile::tempdir().unwrap();
    let prefix = make_prefix(tmp.path()).await;

    // Build a small tarball with the host tar, mirroring how sources
    // arrive from the downloader.
    let tree = tmp.path().join("pkg-0.1");
    fs::create_dir_all(&tree).await.unwrap();
    fs::write(tree.join("README"), b"hi").await.unwrap();
    let tarball = tmp.path().join("pkg-0.1.tar.gz");
    let status = tokio::process::Command::new("tar")
        .args(["-c", "-z", "-f"])
        .arg(&tarball)
        .arg("-C")
        .arg(tmp.path())
        .arg("pkg-0.1")
        .status()
        .await
        .unwrap();
    assert!(status.success());

    let sha256 = Sha256::hash_file(&tarball).await.unwrap();
    let source = Source::Archive {
        path: tarball,
        sha256,
    };
    let staged = stage_all(std::slice::from_ref(&source), &prefix).await.unwrap();
    assert_eq!(staged[0].target, "pkg-0.1");
    assert!(staged[0].path.join("pkg-0.1/README").exists());
}

#[tokio::test]
async fn unknown_archive_format_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let prefix = make_prefix(tmp.path()).await;

    let file = tmp.path().join("blob.rar");
    fs::write(&file, b"???").await.unwrap();
    let source = Source::Archive {
        path: file.clone(),
        sha256: Sha256::hash_file(&file).await.unwrap(),
    };
    assert!(source.stage(&prefix).await.is_err());
}
