//! Test structural invariants under randomized insert orders.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::*;
use crate::storage::{Node, PageId, ROOT_PAGE_ID};

fn random_word(rng: &mut StdRng) -> String {
    let len = rng.random_range(1..=8);
    (0..len)
        .map(|_| char::from(rng.random_range(b'a'..=b'z')))
        .collect()
}

/// Every page id reachable from the root.
fn all_pages(test: &mut TestTree) -> Vec<PageId> {
    let mut pages = Vec::new();
    let mut pending = vec![ROOT_PAGE_ID];
    while let Some(page_id) = pending.pop() {
        pages.push(page_id);
        if let Node::Internal(node) = test.page(page_id).node {
            pending.extend(node.children());
        }
    }
    pages
}

#[test]
fn test_invariants_hold_after_every_batch() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut test = TestTree::new(96);
    let mut inserted = std::collections::BTreeSet::new();

    for _ in 0..20 {
        for _ in 0..25 {
            let word = random_word(&mut rng);
            test.insert_all([word.as_str()]);
            inserted.insert(word);
        }
        test.tree.verify().expect("verify");
        assert_eq!(test.tree.len().expect("len"), inserted.len() as u64);
    }

    let expected: Vec<String> = inserted.into_iter().collect();
    assert_eq!(test.leaf_keys(), expected);
}

#[test]
fn test_stored_counts_match_leaf_scan_for_every_page() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut keys = numeric_keys(0..800, 5);
    keys.shuffle(&mut rng);

    let mut test = TestTree::new(128);
    test.insert_all(&keys);

    for page_id in all_pages(&mut test) {
        let stored = test.page(page_id).subtree_key_count;
        let scanned = test
            .tree
            .count_subtree_by_scan(page_id)
            .expect("count subtree");
        assert_eq!(stored, scanned, "page {page_id}");
    }
}

#[test]
fn test_random_ranges_agree_with_scan() {
    let mut rng = StdRng::seed_from_u64(1234);
    let mut test = TestTree::new(96);
    let words: Vec<String> = (0..400).map(|_| random_word(&mut rng)).collect();
    test.insert_all(&words);

    for _ in 0..200 {
        let lo = random_word(&mut rng);
        let hi = random_word(&mut rng);
        // `count` asserts agreement in both orders, including reversed ranges.
        test.count(&lo, &hi);
        test.count(&hi, &lo);
    }
}
