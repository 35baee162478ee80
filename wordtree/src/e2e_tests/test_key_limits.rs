//! Test the key length limit.

use crate::btree::BTreeError;
use crate::config::MAX_WORD_SIZE;
use crate::e2e_tests::helpers::*;

#[test]
fn test_key_longer_than_page_allows() {
    let mut test = TestTree::new(96);
    test.insert_all(["anna", "bob"]);
    let max = test.config.max_key_size();
    assert!(max < MAX_WORD_SIZE);

    let too_long = "x".repeat(max + 1);
    let result = test.tree.insert(too_long.as_bytes(), 0);
    assert!(matches!(result, Err(BTreeError::KeyTooLong { .. })));

    // The rejected key left no trace and later inserts still work.
    assert_eq!(test.leaf_keys(), vec!["anna", "bob"]);
    test.insert_all(["carl"]);
    assert_eq!(test.count("a", "z"), 3);
    test.tree.verify().expect("verify");
}

#[test]
fn test_word_size_cap_on_large_pages() {
    let mut test = TestTree::new(1024);
    assert_eq!(test.config.max_key_size(), MAX_WORD_SIZE);

    let longest = "y".repeat(MAX_WORD_SIZE);
    assert!(test.tree.insert(longest.as_bytes(), 0).expect("insert"));

    let too_long = "y".repeat(MAX_WORD_SIZE + 1);
    let err = test
        .tree
        .insert(too_long.as_bytes(), 0)
        .expect_err("key should be rejected");
    assert!(!err.is_fatal());
}

#[test]
fn test_longest_keys_still_split() {
    let mut test = TestTree::new(96);
    let max = test.config.max_key_size();
    let keys: Vec<String> = (b'a'..=b'j')
        .map(|c| char::from(c).to_string().repeat(max))
        .collect();
    test.insert_all(&keys);

    assert_eq!(test.tree.len().expect("len"), 10);
    assert_eq!(test.leaf_keys(), keys);
    test.tree.verify().expect("verify");
}
