//! Test that a tree survives closing and reopening its files.

use crate::btree::{BTreeError, WordTree};
use crate::config::TreeConfig;
use crate::e2e_tests::helpers::*;
use crate::storage::FileError;

#[test]
fn test_reopen_keeps_keys_counts_and_postings() {
    let mut test = TestTree::new(128);
    test.insert_all(numeric_keys(0..300, 4));
    test.tree.insert(b"0007", 999).expect("insert duplicate");
    let before = test.count("0050", "0250");

    let mut test = test.reopen();

    assert_eq!(test.count("0050", "0250"), before);
    assert_eq!(test.tree.len().expect("len"), 300);
    assert_eq!(test.tree.postings(b"0007").expect("postings"), vec![7, 999]);
    assert_eq!(test.leaf_keys(), numeric_keys(0..300, 4));
    test.tree.verify().expect("verify");
}

#[test]
fn test_inserts_continue_after_reopen() {
    let mut test = TestTree::new(96);
    test.insert_all(numeric_keys((0..200).filter(|i| i % 2 == 0), 3));

    let mut test = test.reopen();
    test.insert_all(numeric_keys((0..200).filter(|i| i % 2 == 1), 3));

    assert_eq!(test.count("000", "199"), 200);
    assert_eq!(test.leaf_keys(), numeric_keys(0..200, 3));
    test.tree.verify().expect("verify");
}

#[test]
fn test_open_with_wrong_page_size_fails() {
    let mut test = TestTree::new(128);
    test.insert_all(numeric_keys(0..50, 3));
    test.tree.sync().expect("sync");

    // 127 divides no multiple of 128 below 127 pages.
    let dir = test.config.data_directory.clone();
    let config = TreeConfig::new(127)
        .expect("valid config")
        .with_data_directory(dir);
    let result = WordTree::open(config);
    assert!(matches!(
        result,
        Err(BTreeError::File(FileError::NotPageAligned { .. }))
    ));
}

#[test]
fn test_open_missing_tree_fails() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = TreeConfig::default().with_data_directory(dir.path().to_path_buf());

    let result = WordTree::open(config.clone());
    assert!(matches!(result, Err(BTreeError::File(FileError::Io(_)))));

    let mut tree = WordTree::open_or_create(config).expect("open or create");
    assert!(tree.is_empty().expect("len"));
}
