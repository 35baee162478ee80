//! Test inserting many sequential numeric keys.

use crate::e2e_tests::helpers::*;

#[test]
fn test_thousand_sequential_keys() {
    let mut test = TestTree::new(128);
    test.insert_all(numeric_keys(1..=1000, 6));

    assert_eq!(test.count("000100", "000200"), 101);
    assert_eq!(test.count("000001", "001000"), 1000);
    assert_eq!(test.count("000999", "002000"), 2);
    assert_eq!(test.tree.len().expect("len"), 1000);
    test.tree.verify().expect("verify");
}

#[test]
fn test_sequential_keys_default_page_size() {
    let mut test = TestTree::new(1024);
    test.insert_all(numeric_keys(1..=1000, 6));

    assert_eq!(test.count("000100", "000200"), 101);
    assert_eq!(test.leaf_keys(), numeric_keys(1..=1000, 6));
}

#[test]
fn test_descending_inserts() {
    let mut test = TestTree::new(128);
    test.insert_all(numeric_keys((1..=500).rev(), 4));

    assert_eq!(test.count("0100", "0199"), 100);
    assert_eq!(test.leaf_keys(), numeric_keys(1..=500, 4));
    test.tree.verify().expect("verify");
}
