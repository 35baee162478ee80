//! Test inserting the same word many times.

use crate::e2e_tests::helpers::*;

#[test]
fn test_duplicate_does_not_change_counts() {
    let mut test = TestTree::new(96);
    test.insert_all(["bob", "anna", "carl", "dan", "eve"]);

    assert!(!test.tree.insert(b"carl", 100).expect("insert duplicate"));
    assert!(!test.tree.insert(b"eve", 101).expect("insert duplicate"));

    assert_eq!(test.tree.len().expect("len"), 5);
    assert_eq!(test.count("anna", "eve"), 5);
    test.tree.verify().expect("verify");
}

#[test]
fn test_postings_collect_every_occurrence() {
    let mut test = TestTree::new(128);
    let text = "the cat saw the dog and the dog saw the cat";
    for (word, offset) in crate::tokenize::words(text.as_bytes()) {
        test.tree.insert(&word, offset).expect("insert");
    }

    assert_eq!(test.tree.postings(b"the").expect("postings"), vec![0, 12, 24, 36]);
    assert_eq!(test.tree.postings(b"dog").expect("postings"), vec![16, 28]);
    assert_eq!(test.tree.postings(b"bird").expect("postings"), Vec::<u64>::new());
    assert_eq!(test.leaf_keys(), vec!["and", "cat", "dog", "saw", "the"]);
}

#[test]
fn test_long_posting_chains() {
    let mut test = TestTree::new(128);
    for offset in 0..100 {
        test.tree.insert(b"again", offset).expect("insert");
        test.tree
            .insert(format!("w{offset:03}").as_bytes(), offset)
            .expect("insert");
    }

    let expected: Vec<u64> = (0..100).collect();
    assert_eq!(test.tree.postings(b"again").expect("postings"), expected);
    assert_eq!(test.tree.len().expect("len"), 101);
    test.tree.verify().expect("verify");
}
