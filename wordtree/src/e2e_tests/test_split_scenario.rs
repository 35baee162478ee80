//! Test the first root split on a page that holds four short keys.

use crate::e2e_tests::helpers::*;

#[test]
fn test_fifth_insert_splits_root() {
    let mut test = TestTree::new(96);

    test.insert_all(["bob", "anna", "carl", "dan"]);
    let root = test.root();
    assert!(root.as_leaf().is_some());
    assert_eq!(root.key_count, 4);

    test.insert_all(["eve"]);
    let root = test.root();
    let node = root.as_internal().expect("root should be internal");
    assert_eq!(root.key_count, 1);
    assert_eq!(node.child_count(), 2);
    assert_eq!(root.subtree_key_count, 5);

    let left = test.page(node.child_at(0));
    let right = test.page(node.rightmost_child_id);
    assert_eq!(left.subtree_key_count, 3);
    assert_eq!(right.subtree_key_count, 2);
}

#[test]
fn test_range_after_split() {
    let mut test = TestTree::new(96);
    test.insert_all(["bob", "anna", "carl", "dan", "eve", "frank"]);

    assert_eq!(test.count("anna", "dan"), 4);
    assert_eq!(test.count("anna", "frank"), 6);
    assert_eq!(test.count("carl", "eve"), 3);
    assert_eq!(test.count("d", "e"), 1);
    assert_eq!(
        test.leaf_keys(),
        vec!["anna", "bob", "carl", "dan", "eve", "frank"]
    );
    test.tree.verify().expect("verify");
}
