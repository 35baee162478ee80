//! Test range counts at the edges of the key space.

use crate::e2e_tests::helpers::*;

#[test]
fn test_reversed_range_is_empty() {
    let mut test = TestTree::new(96);
    test.insert_all(numeric_keys(0..100, 3));

    assert_eq!(test.count("050", "040"), 0);
    assert_eq!(test.count("zzz", "aaa"), 0);
}

#[test]
fn test_empty_tree() {
    let mut test = TestTree::new(96);

    assert_eq!(test.count("a", "z"), 0);
    assert_eq!(test.count("a", "a"), 0);
}

#[test]
fn test_single_key_range() {
    let mut test = TestTree::new(96);
    test.insert_all(numeric_keys((0..100).map(|i| i * 2), 3));

    assert_eq!(test.count("042", "042"), 1);
    assert_eq!(test.count("043", "043"), 0);
    assert_eq!(test.count("000", "000"), 1);
    assert_eq!(test.count("198", "198"), 1);
}

#[test]
fn test_ranges_outside_keys() {
    let mut test = TestTree::new(96);
    test.insert_all(numeric_keys(100..200, 3));

    assert_eq!(test.count("000", "099"), 0);
    assert_eq!(test.count("200", "999"), 0);
    assert_eq!(test.count("000", "999"), 100);
    assert_eq!(test.count("150", "999"), 50);
    assert_eq!(test.count("000", "149"), 50);
}

#[test]
fn test_bounds_between_keys() {
    let mut test = TestTree::new(96);
    test.insert_all(numeric_keys(0..100, 3));

    // "0105" sorts between "010" and "011".
    assert_eq!(test.count("0105", "0205"), 10);
    assert_eq!(test.count("01", "02"), 10);
}
