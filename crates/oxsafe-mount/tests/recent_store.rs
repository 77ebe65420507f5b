//! Recently used containers store on the native filesystem.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use oxsafe_fs::{FsIo, NativeFs};
use oxsafe_mount::recent::{RECENT_PATHS_FILE, DEFAULT_MAX_ENTRIES};
use oxsafe_mount::{RecentPathsError, RecentlyUsedPathStore};
use tempfile::TempDir;

fn native() -> Arc<dyn FsIo> {
    Arc::new(NativeFs::new())
}

fn store_in(dir: &TempDir) -> RecentlyUsedPathStore {
    RecentlyUsedPathStore::open(native(), dir.path().join(RECENT_PATHS_FILE), DEFAULT_MAX_ENTRIES)
        .unwrap()
}

fn paths(list: &[&str]) -> Vec<PathBuf> {
    list.iter().map(PathBuf::from).collect()
}

#[test]
fn test_most_recent_first_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let mut store = store_in(&dir);

    store.use_path("/p1").unwrap();
    store.use_path("/p2").unwrap();
    store.use_path("/p1").unwrap();

    assert_eq!(store.recently_used_paths(), paths(&["/p1", "/p2"]).as_slice());
    assert_eq!(store.front(), Some(Path::new("/p1")));
    assert_eq!(store.revision(), 3);

    let reopened = store_in(&dir);
    assert_eq!(reopened.recently_used_paths(), store.recently_used_paths());
    assert_eq!(reopened.revision(), 3);
}

#[test]
fn test_clear_then_reload_is_empty() {
    let dir = TempDir::new().unwrap();
    let mut store = store_in(&dir);
    store.use_path("/p1").unwrap();

    store.clear().unwrap();
    store.reload().unwrap();
    assert!(store.is_empty());
    assert!(store_in(&dir).is_empty());
}

#[test]
fn test_external_revision_bump_is_consistency_error() {
    let dir = TempDir::new().unwrap();
    let mut ours = store_in(&dir);
    ours.use_path("/mine").unwrap();

    // Another process saves in between
    let mut theirs = store_in(&dir);
    theirs.use_path("/theirs").unwrap();

    let err = ours.use_path("/mine-again").unwrap_err();
    assert!(matches!(
        err,
        RecentPathsError::Consistency {
            expected: 1,
            found: 2
        }
    ));

    // File untouched by the refused save
    let on_disk = store_in(&dir);
    assert_eq!(on_disk.recently_used_paths(), paths(&["/theirs", "/mine"]).as_slice());

    ours.reload().unwrap();
    ours.use_path("/mine-again").unwrap();
    assert_eq!(ours.front(), Some(Path::new("/mine-again")));
}

#[test]
fn test_corrupt_file_is_parse_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(RECENT_PATHS_FILE), "garbage\n").unwrap();
    let result =
        RecentlyUsedPathStore::open(native(), dir.path().join(RECENT_PATHS_FILE), DEFAULT_MAX_ENTRIES);
    assert!(matches!(result, Err(RecentPathsError::Parse(_))));
}

#[test]
fn test_unicode_paths_survive() {
    let dir = TempDir::new().unwrap();
    let mut store = store_in(&dir);
    store.use_path("/Users/zoë/Tresor ünd Co").unwrap();

    let reopened = store_in(&dir);
    assert_eq!(reopened.front(), Some(Path::new("/Users/zoë/Tresor ünd Co")));
}

#[test]
fn test_missing_directory_is_fs_error_on_save() {
    let dir = TempDir::new().unwrap();
    let mut store = RecentlyUsedPathStore::open(
        native(),
        dir.path().join("no-such-dir").join(RECENT_PATHS_FILE),
        DEFAULT_MAX_ENTRIES,
    )
    .unwrap();
    assert!(store.is_empty());
    assert!(matches!(store.use_path("/p"), Err(RecentPathsError::Fs(_))));
}
