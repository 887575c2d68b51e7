#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use common::{snapshot_dir, snapshot_name};
use regex::Regex;
use tempfile::TempDir;
use volcache::{DirectoryIndex, IndexError, RefreshOutcome};

fn filter() -> Regex {
    Regex::new(volcache::config::DEFAULT_FILTER).unwrap()
}

#[tokio::test]
async fn scan_filters_and_sorts_and_anchors_at_newest() {
    let dir = snapshot_dir(3);
    std::fs::write(dir.path().join("notes.txt"), b"not a snapshot").unwrap();
    std::fs::write(dir.path().join("model.swap"), b"wrong extension").unwrap();

    let index = DirectoryIndex::open(dir.path(), filter()).await.unwrap();
    let expected: Vec<String> = (0..3).map(snapshot_name).collect();
    assert_eq!(index.listing(), expected.as_slice());
    assert_eq!(index.current(), 2, "opens on the newest snapshot");
}

#[tokio::test]
async fn empty_match_set_is_a_hard_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("unrelated.dat"), b"x").unwrap();

    let err = DirectoryIndex::open(dir.path(), filter()).await.unwrap_err();
    assert!(matches!(err, IndexError::EmptyListing(_)), "got {err:?}");
}

#[tokio::test]
async fn refresh_with_unchanged_listing_is_a_noop() {
    let dir = snapshot_dir(4);
    let mut index = DirectoryIndex::open(dir.path(), filter()).await.unwrap();
    index.set_current(1);

    let outcome = index.refresh().await.unwrap();
    assert!(matches!(outcome, RefreshOutcome::Unchanged));
    assert_eq!(index.current(), 1);
}

#[tokio::test]
async fn reconciliation_follows_filenames_through_renumbering() {
    // Listing [a, b, c], current at c, then b removed and d appended:
    // current must follow c to index 1, a stays at 0, b's remap is gone.
    let dir = snapshot_dir(3);
    let mut index = DirectoryIndex::open(dir.path(), filter()).await.unwrap();
    assert_eq!(index.current(), 2);

    std::fs::remove_file(dir.path().join(snapshot_name(1))).unwrap();
    std::fs::write(dir.path().join(snapshot_name(3)), b"d").unwrap();

    let RefreshOutcome::Changed(remap) = index.refresh().await.unwrap() else {
        panic!("listing changed, refresh must report it");
    };
    assert_eq!(index.current(), 1, "c moved from index 2 to index 1");
    assert_eq!(remap.remap(0), Some(0), "a is untouched");
    assert_eq!(remap.remap(1), None, "b was removed");
    assert_eq!(remap.remap(2), Some(1), "c was renumbered");
}

#[tokio::test]
async fn current_collapses_to_last_when_its_file_disappears() {
    let dir = snapshot_dir(5);
    let mut index = DirectoryIndex::open(dir.path(), filter()).await.unwrap();
    index.set_current(2);

    std::fs::remove_file(dir.path().join(snapshot_name(2))).unwrap();
    std::fs::remove_file(dir.path().join(snapshot_name(4))).unwrap();

    index.refresh().await.unwrap();
    assert_eq!(index.len(), 3);
    assert_eq!(index.current(), 2, "collapses to the last index");
}

#[tokio::test]
async fn growing_directory_keeps_position_stable() {
    let dir = snapshot_dir(3);
    let mut index = DirectoryIndex::open(dir.path(), filter()).await.unwrap();
    index.set_current(1);

    // New snapshots appended past the current one.
    std::fs::write(dir.path().join(snapshot_name(3)), b"new").unwrap();
    std::fs::write(dir.path().join(snapshot_name(4)), b"newer").unwrap();

    index.refresh().await.unwrap();
    assert_eq!(index.len(), 5);
    assert_eq!(index.current(), 1, "appends do not move the viewer");
}

#[tokio::test]
async fn change_directory_clamps_position_into_new_range() {
    let big = snapshot_dir(10);
    let small = snapshot_dir(3);
    let mut index = DirectoryIndex::open(big.path(), filter()).await.unwrap();
    assert_eq!(index.current(), 9);

    index.change_directory(small.path()).await.unwrap();
    assert_eq!(index.len(), 3);
    assert_eq!(index.current(), 2);
    assert_eq!(index.dir(), small.path());
}

#[tokio::test]
async fn path_at_joins_directory_and_filename() {
    let dir = snapshot_dir(2);
    let index = DirectoryIndex::open(dir.path(), filter()).await.unwrap();
    assert_eq!(index.path_at(0), dir.path().join(snapshot_name(0)));
}
