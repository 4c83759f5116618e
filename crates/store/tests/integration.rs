//! Integration tests for the artifact store

use crossforge_store::ArtifactStore;
use tokio::fs;

async fn make_tree(root: &std::path::Path, payload: &[u8]) {
    fs::create_dir_all(root.join("lib")).await.unwrap();
    fs::write(root.join("lib/libfoo.so"), payload).await.unwrap();
    fs::write(root.join("LICENSE"), b"MIT").await.unwrap();
}

#[tokio::test]
async fn identical_trees_share_one_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(tmp.path().join("store"));

    let a = tmp.path().join("a");
    let b = tmp.path().join("b");
    make_tree(&a, b"payload").await;
    make_tree(&b, b"payload").await;

    let ha = store.install_from_dir(&a).await.unwrap();
    let hb = store.install_from_dir(&b).await.unwrap();
    assert_eq!(ha, hb);

    let mut entries = fs::read_dir(store.root()).await.unwrap();
    let mut count = 0;
    while entries.next_entry().await.unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 1);
}

#[tokio::test]
async fn concurrent_producers_of_the_same_tree_both_succeed() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(tmp.path().join("store"));

    let src = tmp.path().join("src");
    make_tree(&src, b"racy").await;

    let (ra, rb) = tokio::join!(store.install_from_dir(&src), store.install_from_dir(&src));
    let ha = ra.unwrap();
    let hb = rb.unwrap();
    assert_eq!(ha, hb);
    assert!(store.contains(&ha).await);

    // No staging leftovers survive the race.
    let mut entries = fs::read_dir(store.root()).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        let name = entry.file_name();
        assert!(
            !name.to_string_lossy().starts_with(".tmp-"),
            "staging dir left behind: {name:?}"
        );
    }
}

#[tokio::test]
async fn resolve_reports_missing_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(tmp.path().join("store"));
    let missing = crossforge_hash::TreeHash::from_bytes([9u8; 20]);
    assert!(store.resolve(&missing).await.is_err());
}
