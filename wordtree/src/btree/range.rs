//! Range counting.
//!
//! `count_in_range` answers "how many keys lie in `[lo, hi]`" from the
//! subtree counts. It descends to the page where the paths to `lo` and `hi`
//! diverge, walks one boundary path down each side, and for the children
//! between the two paths reads whichever set of stored counts needs fewer
//! fetches: the covered children, or the uncovered ones subtracted from the
//! page's own total.
//!
//! `count_in_range_by_scan` walks the leaf chain instead and is used to
//! cross-check the result.

use crate::btree::tree::{BTreeError, WordTree};
use crate::storage::{InternalNode, Node, Page, PageId, PostingsStore, ROOT_PAGE_ID};

impl<P: PostingsStore> WordTree<P> {
    /// Number of keys `k` with `lo <= k <= hi`.
    ///
    /// Returns 0 when `lo > hi`.
    pub fn count_in_range(&mut self, lo: &[u8], hi: &[u8]) -> Result<u64, BTreeError> {
        if lo > hi {
            return Ok(0);
        }

        let mut page = self.file.fetch(ROOT_PAGE_ID)?;
        loop {
            let next = match &page.node {
                Node::Leaf(leaf) => {
                    let count = leaf.count_between(lo, hi);
                    self.file.free(page);
                    return Ok(count);
                }
                Node::Internal(node) => {
                    let l = node.child_index_for(lo);
                    // Both ends route to child `l` unless `hi` lies past its separator.
                    if l == node.entries.len() || hi <= node.entries[l].key.as_slice() {
                        node.child_at(l)
                    } else {
                        let count =
                            self.count_diverging(page.page_id, page.subtree_key_count, node, lo, hi)?;
                        self.file.free(page);
                        return Ok(count);
                    }
                }
            };
            self.file.free(page);
            page = self.file.fetch(next)?;
        }
    }

    /// Count `[lo, hi]` at the page where the two paths split.
    ///
    /// `node` has a separator at `child_index_for(lo)` that is below `hi`.
    fn count_diverging(
        &mut self,
        page_id: PageId,
        subtree_key_count: u64,
        node: &InternalNode,
        lo: &[u8],
        hi: &[u8],
    ) -> Result<u64, BTreeError> {
        let l = node.child_index_for(lo);
        let r = l + 1 + node.entries[l + 1..].partition_point(|e| e.key.as_slice() < hi);

        let left = self.file.fetch(node.child_at(l))?;
        let right = self.file.fetch(node.child_at(r))?;
        let left_total = left.subtree_key_count;
        let right_total = right.subtree_key_count;
        let from_left = self.count_at_least(left, lo)?;
        let from_right = self.count_at_most(right, hi)?;

        let inner = r - l - 1;
        let outside = node.child_count() - 1 - inner;
        let middle = if inner <= outside {
            self.sum_subtree_counts((l + 1..r).map(|i| node.child_at(i)))?
        } else {
            let others = self.sum_subtree_counts(
                (0..l)
                    .chain(r + 1..node.child_count())
                    .map(|i| node.child_at(i)),
            )?;
            remainder(page_id, subtree_key_count, left_total + right_total + others)?
        };

        Ok(from_left + middle + from_right)
    }

    /// Number of keys `>= lo` under `page`. Consumes the page.
    ///
    /// Only the child covering `lo` is descended; the children after it
    /// count in full.
    fn count_at_least(&mut self, page: Page, lo: &[u8]) -> Result<u64, BTreeError> {
        let count = match &page.node {
            Node::Leaf(leaf) => leaf.count_at_least(lo),
            Node::Internal(node) => {
                let idx = node.child_index_for(lo);
                let boundary = self.file.fetch(node.child_at(idx))?;
                let boundary_total = boundary.subtree_key_count;
                let partial = self.count_at_least(boundary, lo)?;

                let after = node.child_count() - idx - 1;
                let full = if after <= idx {
                    self.sum_subtree_counts((idx + 1..node.child_count()).map(|i| node.child_at(i)))?
                } else {
                    let before = self.sum_subtree_counts((0..idx).map(|i| node.child_at(i)))?;
                    remainder(page.page_id, page.subtree_key_count, boundary_total + before)?
                };
                partial + full
            }
        };
        self.file.free(page);
        Ok(count)
    }

    /// Number of keys `<= hi` under `page`. Consumes the page.
    ///
    /// Mirror of `count_at_least`: the children before the one covering
    /// `hi` count in full.
    fn count_at_most(&mut self, page: Page, hi: &[u8]) -> Result<u64, BTreeError> {
        let count = match &page.node {
            Node::Leaf(leaf) => leaf.count_at_most(hi),
            Node::Internal(node) => {
                let idx = node.child_index_for(hi);
                let boundary = self.file.fetch(node.child_at(idx))?;
                let boundary_total = boundary.subtree_key_count;
                let partial = self.count_at_most(boundary, hi)?;

                let after = node.child_count() - idx - 1;
                let full = if idx <= after {
                    self.sum_subtree_counts((0..idx).map(|i| node.child_at(i)))?
                } else {
                    let rest = self
                        .sum_subtree_counts((idx + 1..node.child_count()).map(|i| node.child_at(i)))?;
                    remainder(page.page_id, page.subtree_key_count, boundary_total + rest)?
                };
                partial + full
            }
        };
        self.file.free(page);
        Ok(count)
    }

    /// Number of keys `k` with `lo <= k <= hi`, counted along the leaf chain.
    ///
    /// Sums whole leaves between the leaf holding `lo` and the leaf holding
    /// `hi`, counting only the in-range entries of those two. Ignores the
    /// stored subtree counts.
    pub fn count_in_range_by_scan(&mut self, lo: &[u8], hi: &[u8]) -> Result<u64, BTreeError> {
        if lo > hi {
            return Ok(0);
        }

        let first = self.leaf_id_for(lo)?;
        let last = self.leaf_id_for(hi)?;
        let mut count = 0;
        self.for_each_leaf(first, Some(last), |page, leaf| {
            count += match (page.page_id == first, page.page_id == last) {
                (true, true) => leaf.count_between(lo, hi),
                (true, false) => leaf.count_at_least(lo),
                (false, true) => leaf.count_at_most(hi),
                (false, false) => u64::from(page.key_count),
            };
            Ok(())
        })?;
        Ok(count)
    }
}

/// `total - excluded`, where `excluded` are counts read from the children.
///
/// A child total larger than its parent's means the stored counts disagree.
fn remainder(page_id: PageId, total: u64, excluded: u64) -> Result<u64, BTreeError> {
    total
        .checked_sub(excluded)
        .ok_or(BTreeError::CountMismatch {
            page_id,
            expected: total,
            actual: excluded,
        })
}
