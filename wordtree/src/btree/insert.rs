//! Key insertion with propagated splits.
//!
//! `insert` walks from the root to the leaf covering the key, holding each
//! page on the way down. On the way back up every page on the path gains one
//! key in its subtree count, and a page that no longer fits splits and hands
//! its separator to the parent. If the root splits, its left half moves to a
//! fresh page so the new root can stay at page 1.

use crate::btree::tree::{BTreeError, WordTree};
use crate::storage::{
    CHILD_FIELD_SIZE, FileError, InternalNode, KEY_LEN_FIELD_SIZE, LeafEntry, LeafNode, Node,
    PAGE_HEADER_SIZE, POSTING_FIELD_SIZE, Page, PageId, PostingsStore, ROOT_PAGE_ID, TextPtr,
    UpKey,
};

/// What one level of the insertion reports to its parent.
#[derive(Debug, PartialEq, Eq)]
enum InsertOutcome {
    /// A new key went in and the page still fits.
    Added,
    /// The key was already present; only its posting changed.
    Duplicate,
    /// A new key went in and the page split.
    Split(UpKey),
}

impl<P: PostingsStore> WordTree<P> {
    /// Insert one occurrence of `key` at text offset `text`.
    ///
    /// Returns `true` if the key is new to the tree, `false` if it was
    /// already present and `text` was added to its posting.
    ///
    /// Keys longer than the configured maximum are rejected without touching
    /// the tree.
    pub fn insert(&mut self, key: &[u8], text: TextPtr) -> Result<bool, BTreeError> {
        if key.is_empty() {
            return Err(BTreeError::EmptyKey);
        }
        let max = self.config.max_key_size();
        if key.len() > max {
            tracing::warn!(
                "rejecting key {} ({} bytes, max {max})",
                String::from_utf8_lossy(key),
                key.len()
            );
            return Err(BTreeError::KeyTooLong {
                len: key.len(),
                max,
            });
        }

        match self.propagated_insert(ROOT_PAGE_ID, key, text)? {
            InsertOutcome::Added => Ok(true),
            InsertOutcome::Duplicate => Ok(false),
            InsertOutcome::Split(up) => {
                self.split_root(up)?;
                Ok(true)
            }
        }
    }

    fn propagated_insert(
        &mut self,
        page_id: PageId,
        key: &[u8],
        text: TextPtr,
    ) -> Result<InsertOutcome, BTreeError> {
        let mut page = self.file.fetch(page_id)?;

        match &mut page.node {
            Node::Leaf(leaf) => match leaf.find(key) {
                Ok(index) => {
                    let entry = &mut leaf.entries[index];
                    let before = entry.posting;
                    self.postings.update(&mut entry.posting, text)?;
                    if entry.posting == before {
                        self.file.free(page);
                    } else {
                        self.file.flush(page)?;
                    }
                    return Ok(InsertOutcome::Duplicate);
                }
                Err(index) => {
                    let posting = self.postings.create(text)?;
                    leaf.entries.insert(
                        index,
                        LeafEntry {
                            key: key.to_vec(),
                            posting,
                        },
                    );
                }
            },
            Node::Internal(node) => {
                let child_id = node.child_for(key);
                match self.propagated_insert(child_id, key, text)? {
                    InsertOutcome::Duplicate => {
                        self.file.free(page);
                        return Ok(InsertOutcome::Duplicate);
                    }
                    InsertOutcome::Added => {}
                    InsertOutcome::Split(up) => {
                        let expected_child = up.left;
                        if !node.insert_separator(up) {
                            return Err(BTreeError::BrokenChildPointer {
                                page_id,
                                expected_child,
                            });
                        }
                    }
                }
            }
        }

        page.subtree_key_count += 1;
        if self.file.fits(&page) {
            self.file.flush(page)?;
            Ok(InsertOutcome::Added)
        } else {
            self.split(page).map(InsertOutcome::Split)
        }
    }

    /// Split an overflowing page in two.
    ///
    /// The left half keeps the first entries and its page id; the right half
    /// goes to a new page. The cut is at `ceil(n / 2)` unless uneven key
    /// lengths leave a half too large, see [`split_point`]. Both halves are
    /// built and checked before either is written.
    fn split(&mut self, page: Page) -> Result<UpKey, BTreeError> {
        let byte_size = page.encoded_size();
        let n = page.len();
        let Page {
            page_id,
            subtree_key_count,
            node,
            ..
        } = page;

        let Some(first_half) = split_point(&node, self.file.page_size()) else {
            return Err(FileError::PageOverflow {
                page_id,
                byte_size,
                capacity: self.file.page_size(),
            }
            .into());
        };
        let new_id = self.file.allocate_new_id();

        let (left, right, key) = match node {
            Node::Leaf(leaf) => split_leaf(page_id, new_id, leaf, first_half),
            Node::Internal(internal) => {
                self.split_internal(page_id, new_id, internal, first_half, subtree_key_count)?
            }
        };

        for half in [&left, &right] {
            if !self.file.fits(half) {
                return Err(FileError::PageOverflow {
                    page_id: half.page_id,
                    byte_size: half.encoded_size(),
                    capacity: self.file.page_size(),
                }
                .into());
            }
        }

        tracing::debug!(
            "split page {page_id} ({n} keys) into {page_id} and {new_id} at {}",
            String::from_utf8_lossy(&key)
        );
        self.file.flush(left)?;
        self.file.flush(right)?;

        Ok(UpKey {
            left: page_id,
            right: new_id,
            key,
        })
    }

    /// The separator moves up and is removed from both halves.
    ///
    /// Its child becomes the left half's rightmost child, and the left
    /// half's old rightmost child moves to the right half. Subtree counts
    /// are summed from the children of each half.
    fn split_internal(
        &mut self,
        page_id: PageId,
        new_id: PageId,
        mut internal: InternalNode,
        first_half: usize,
        subtree_key_count: u64,
    ) -> Result<(Page, Page, Vec<u8>), BTreeError> {
        let mut right_entries = internal.entries.split_off(first_half - 1);
        let middle = right_entries.remove(0);

        let right = InternalNode {
            rightmost_child_id: internal.rightmost_child_id,
            entries: right_entries,
        };
        internal.rightmost_child_id = middle.child_id;

        let left_count = self.sum_subtree_counts(internal.children())?;
        let right_count = self.sum_subtree_counts(right.children())?;
        if left_count + right_count != subtree_key_count {
            return Err(BTreeError::CountMismatch {
                page_id,
                expected: subtree_key_count,
                actual: left_count + right_count,
            });
        }

        Ok((
            internal_page(page_id, internal, left_count),
            internal_page(new_id, right, right_count),
            middle.key,
        ))
    }

    /// Grow the tree by one level.
    ///
    /// The root's left half, already written at page 1, is moved to a new
    /// page and a fresh internal root pointing at both halves takes its place.
    fn split_root(&mut self, up: UpKey) -> Result<(), BTreeError> {
        let mut left = self.file.fetch(ROOT_PAGE_ID)?;
        let relocated_id = self.file.allocate_new_id();
        left.page_id = relocated_id;
        let left_count = left.subtree_key_count;

        let right = self.file.fetch(up.right)?;
        let right_count = right.subtree_key_count;
        self.file.free(right);

        let root = Page::new_internal(
            ROOT_PAGE_ID,
            UpKey {
                left: relocated_id,
                right: up.right,
                key: up.key,
            },
            left_count + right_count,
        );

        tracing::debug!(
            "root split: left half moved to page {relocated_id}, right half at page {}",
            up.right
        );
        self.file.flush(left)?;
        self.file.flush(root)?;
        Ok(())
    }
}

/// Choose `first_half` for a split so that both halves fit in `capacity`.
///
/// Candidates are tried by distance from `ceil(n / 2)`, lower index first on
/// ties. An internal split also gives up entry `first_half - 1` to the parent,
/// so its left half is one entry shorter and either half may end up with only
/// a rightmost child. Returns `None` if no cut works, which can only happen
/// when single entries take more than half a page.
fn split_point(node: &Node, capacity: usize) -> Option<usize> {
    let (sizes, separator_moves_up): (Vec<usize>, bool) = match node {
        Node::Leaf(leaf) => (
            leaf.entries
                .iter()
                .map(|e| KEY_LEN_FIELD_SIZE + e.key.len() + POSTING_FIELD_SIZE)
                .collect(),
            false,
        ),
        Node::Internal(internal) => (
            internal
                .entries
                .iter()
                .map(|e| CHILD_FIELD_SIZE + KEY_LEN_FIELD_SIZE + e.key.len())
                .collect(),
            true,
        ),
    };
    let n = sizes.len();
    if n < 2 {
        return None;
    }

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0usize);
    for size in &sizes {
        prefix.push(prefix[prefix.len() - 1] + size);
    }
    let total = prefix[n];
    let room = capacity.saturating_sub(PAGE_HEADER_SIZE);
    let fits = |first_half: usize| {
        let left_end = if separator_moves_up {
            first_half - 1
        } else {
            first_half
        };
        prefix[left_end] <= room && total - prefix[first_half] <= room
    };

    let last = if separator_moves_up { n } else { n - 1 };
    let middle = n.div_ceil(2);
    let mut candidates: Vec<usize> = (1..=last).collect();
    candidates.sort_by_key(|&first_half| first_half.abs_diff(middle));
    candidates.into_iter().find(|&first_half| fits(first_half))
}

/// Split a leaf after its first `first_half` entries.
///
/// The separator is the last key of the left half; it stays in the left leaf.
fn split_leaf(
    page_id: PageId,
    new_id: PageId,
    mut leaf: LeafNode,
    first_half: usize,
) -> (Page, Page, Vec<u8>) {
    let right_entries = leaf.entries.split_off(first_half);
    let key = leaf.entries[first_half - 1].key.clone();

    let right = LeafNode {
        next_leaf_id: leaf.next_leaf_id,
        entries: right_entries,
    };
    leaf.next_leaf_id = Some(new_id);

    (leaf_page(page_id, leaf), leaf_page(new_id, right), key)
}

fn leaf_page(page_id: PageId, leaf: LeafNode) -> Page {
    let mut page = Page {
        page_id,
        byte_size: 0,
        key_count: 0,
        subtree_key_count: leaf.entries.len() as u64,
        node: Node::Leaf(leaf),
    };
    page.refresh_header();
    page
}

fn internal_page(page_id: PageId, internal: InternalNode, subtree_key_count: u64) -> Page {
    let mut page = Page {
        page_id,
        byte_size: 0,
        key_count: 0,
        subtree_key_count,
        node: Node::Internal(internal),
    };
    page.refresh_header();
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::storage::{MemoryPostings, PostingRef};
    use tempfile::tempdir;

    fn memory_tree(dir: &tempfile::TempDir, page_size: usize) -> WordTree<MemoryPostings> {
        let config = TreeConfig::new(page_size)
            .expect("valid config")
            .with_data_directory(dir.path().to_path_buf());
        WordTree::create_with_postings(config, MemoryPostings::new(2)).expect("create tree")
    }

    fn root(tree: &mut WordTree<MemoryPostings>) -> Page {
        tree.file.fetch(ROOT_PAGE_ID).expect("fetch root")
    }

    #[test]
    fn test_insert_into_root_leaf() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 96);

        for word in ["bob", "anna", "carl", "dan"] {
            assert!(tree.insert(word.as_bytes(), 0).expect("insert"));
        }

        let root = root(&mut tree);
        assert_eq!(root.keys(), vec![&b"anna"[..], b"bob", b"carl", b"dan"]);
        assert_eq!(root.subtree_key_count, 4);
        assert_eq!(root.byte_size, 87);
    }

    #[test]
    fn test_fifth_key_splits_root() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 96);
        for word in ["bob", "anna", "carl", "dan", "eve"] {
            tree.insert(word.as_bytes(), 0).expect("insert");
        }

        let root = root(&mut tree);
        let node = root.as_internal().expect("root is internal");
        assert_eq!(root.keys(), vec![&b"carl"[..]]);
        assert_eq!(root.subtree_key_count, 5);

        // The old root's left half was relocated, the right half kept its page.
        let left = tree.file.fetch(node.child_at(0)).expect("fetch left");
        let right = tree.file.fetch(node.rightmost_child_id).expect("fetch right");
        assert_eq!(left.keys(), vec![&b"anna"[..], b"bob", b"carl"]);
        assert_eq!(right.keys(), vec![&b"dan"[..], b"eve"]);
        assert_eq!(
            left.as_leaf().expect("leaf").next_leaf_id,
            Some(right.page_id)
        );
        assert_eq!(right.as_leaf().expect("leaf").next_leaf_id, None);
        assert_eq!(left.subtree_key_count + right.subtree_key_count, 5);
    }

    #[test]
    fn test_duplicate_keeps_key_count() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 96);
        for word in ["bob", "anna", "carl", "dan", "eve"] {
            tree.insert(word.as_bytes(), 1).expect("insert");
        }

        assert!(!tree.insert(b"anna", 2).expect("insert duplicate"));
        assert!(!tree.insert(b"anna", 3).expect("insert duplicate"));

        assert_eq!(tree.len().expect("len"), 5);
        assert_eq!(tree.postings(b"anna").expect("postings"), vec![1, 2, 3]);
        tree.verify().expect("verify");
    }

    #[test]
    fn test_duplicate_flushes_leaf_only_when_posting_moves() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 128);
        tree.insert(b"word", 1).expect("insert");

        // Head block has room for a second pointer: the reference stays put.
        tree.reset_stats();
        tree.insert(b"word", 2).expect("insert duplicate");
        assert_eq!(tree.io_stats().writes, 0);
        assert_eq!(tree.io_stats().frees, 1);

        // Head block is full: a new block is chained and the leaf rewritten.
        tree.reset_stats();
        tree.insert(b"word", 3).expect("insert duplicate");
        assert_eq!(tree.io_stats().writes, 1);

        assert_eq!(tree.postings(b"word").expect("postings"), vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_frees_every_page_on_path() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 96);
        for i in 0..40 {
            tree.insert(format!("k{i:02}").as_bytes(), 0).expect("insert");
        }

        tree.reset_stats();
        tree.insert(b"k17", 1).expect("insert duplicate");
        let stats = tree.io_stats();
        assert_eq!(stats.writes, 0);
        assert_eq!(stats.frees, stats.reads);
    }

    #[test]
    fn test_key_too_long_is_rejected_without_change() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 96);
        tree.insert(b"short", 0).expect("insert");

        let max = tree.config().max_key_size();
        let long = vec![b'x'; max + 1];
        tree.reset_stats();
        let err = tree.insert(&long, 0).expect_err("key too long");

        assert!(matches!(err, BTreeError::KeyTooLong { len, max: m } if len == max + 1 && m == max));
        assert!(!err.is_fatal());
        assert_eq!(tree.io_stats().reads, 0);
        assert_eq!(tree.leaf_keys().expect("leaf keys"), vec![b"short".to_vec()]);

        let longest = vec![b'y'; max];
        assert!(tree.insert(&longest, 0).expect("insert longest key"));
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 96);

        assert!(matches!(tree.insert(b"", 0), Err(BTreeError::EmptyKey)));
        assert!(tree.is_empty().expect("len"));
    }

    #[test]
    fn test_internal_split_keeps_counts() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 96);
        for i in 0..200u64 {
            tree.insert(format!("{i:05}").as_bytes(), i).expect("insert");
        }

        let root = root(&mut tree);
        let node = root.as_internal().expect("root is internal");
        let child = tree.file.fetch(node.child_at(0)).expect("fetch child");
        assert!(child.as_internal().is_some(), "tree should be at least three levels");

        assert_eq!(root.subtree_key_count, 200);
        tree.verify().expect("verify");
        let expected: Vec<Vec<u8>> = (0..200).map(|i| format!("{i:05}").into_bytes()).collect();
        assert_eq!(tree.leaf_keys().expect("leaf keys"), expected);
    }

    #[test]
    fn test_split_builds_both_halves() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 96);
        let new_leaf = tree.file.allocate_new_id();
        tree.file.flush(Page::new_leaf(new_leaf)).expect("flush");

        let mut page = Page::new_leaf(new_leaf);
        let Node::Leaf(leaf) = &mut page.node else {
            panic!("expected a leaf");
        };
        for key in ["a", "b", "c", "d", "e"] {
            leaf.entries.push(LeafEntry {
                key: key.as_bytes().to_vec(),
                posting: PostingRef::new(0),
            });
        }
        page.subtree_key_count = 5;

        let up = tree.split(page).expect("split");
        assert_eq!(up.left, new_leaf);
        assert_eq!(up.key, b"c".to_vec());

        let left = tree.file.fetch(up.left).expect("fetch left");
        let right = tree.file.fetch(up.right).expect("fetch right");
        assert_eq!(left.key_count, 3);
        assert_eq!(right.key_count, 2);
        assert_eq!(left.subtree_key_count + right.subtree_key_count, 5);
    }

    #[test]
    fn test_uneven_keys_move_split_point() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, TreeConfig::DEFAULT_PAGE_SIZE);
        for c in b'a'..=b'i' {
            tree.insert(&[c; 88], 0).expect("insert long key");
        }
        for c in b'q'..=b'y' {
            tree.insert(&[c], 0).expect("insert short key");
        }

        // Cutting after ten entries would leave 1025 bytes on the left.
        assert!(tree.insert(&[b'j'; 100], 0).expect("insert longest key"));

        let root = root(&mut tree);
        let node = root.as_internal().expect("root is internal");
        assert_eq!(root.keys(), vec![&[b'i'; 88][..]]);
        let left = tree.file.fetch(node.child_at(0)).expect("fetch left");
        let right = tree.file.fetch(node.rightmost_child_id).expect("fetch right");
        assert_eq!(left.key_count, 9);
        assert_eq!(right.key_count, 10);
        assert_eq!(tree.len().expect("len"), 19);
        tree.verify().expect("verify");
    }

    #[test]
    fn test_split_point_without_a_fitting_cut() {
        let entry = |key: &[u8]| LeafEntry {
            key: key.to_vec(),
            posting: PostingRef::new(0),
        };
        let node = Node::Leaf(LeafNode {
            next_leaf_id: None,
            entries: vec![entry(b"a"), entry(&[b'b'; 21]), entry(b"c")],
        });

        // 31 bytes of room per half: the long middle entry fits alone only.
        assert_eq!(split_point(&node, 64), None);
        assert_eq!(split_point(&node, 96), Some(2));
    }
}
