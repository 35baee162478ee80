//! The word tree handle.
//!
//! `WordTree` owns the page file and the postings store. Insertion lives in
//! `insert.rs` and range counting in `range.rs`; this file holds creation,
//! lookups, leaf chain walks and the structural checks.

use std::io::Write;

use crate::config::{ConfigError, TreeConfig};
use crate::storage::{
    FileError, FilePostings, InternalNode, IoStats, LeafNode, Node, Page, PageFile, PageId,
    PostingRef, PostingsError, PostingsStore, ROOT_PAGE_ID, TextPtr,
};

/// A disk-backed B+-tree of words with per-page subtree key counts.
pub struct WordTree<P: PostingsStore = FilePostings> {
    pub(crate) file: PageFile,
    pub(crate) postings: P,
    pub(crate) config: TreeConfig,
}

impl WordTree<FilePostings> {
    /// Create a new tree and postings file in the configured data directory.
    ///
    /// Fails if either file already exists.
    pub fn create(config: TreeConfig) -> Result<Self, BTreeError> {
        let file = Self::create_page_file(&config)?;
        let postings = FilePostings::create(&config.postings_path(), config.postings_per_block)?;
        Ok(Self {
            file,
            postings,
            config,
        })
    }

    /// Open an existing tree and postings file.
    ///
    /// The page size in `config` must match the one the tree was created with.
    pub fn open(config: TreeConfig) -> Result<Self, BTreeError> {
        config.validate()?;
        let mut file = PageFile::open(&config.tree_path(), config.page_size)?;

        // Reject files without a readable root up front.
        let root = file.fetch(ROOT_PAGE_ID)?;
        let keys = root.subtree_key_count;
        file.free(root);
        file.reset_stats();

        let postings = FilePostings::open(&config.postings_path(), config.postings_per_block)?;
        tracing::info!(
            "opened word tree at {} ({keys} keys, {} pages)",
            config.tree_path().display(),
            file.total_pages()
        );
        Ok(Self {
            file,
            postings,
            config,
        })
    }

    /// Open the tree if its page file exists, otherwise create it.
    pub fn open_or_create(config: TreeConfig) -> Result<Self, BTreeError> {
        if config.tree_path().exists() {
            Self::open(config)
        } else {
            Self::create(config)
        }
    }
}

impl<P: PostingsStore> WordTree<P> {
    /// Create a new tree that keeps its postings in `postings`.
    pub fn create_with_postings(config: TreeConfig, postings: P) -> Result<Self, BTreeError> {
        let file = Self::create_page_file(&config)?;
        Ok(Self {
            file,
            postings,
            config,
        })
    }

    /// Create the page file with an empty leaf as root.
    fn create_page_file(config: &TreeConfig) -> Result<PageFile, BTreeError> {
        config.validate()?;
        let path = config.tree_path();
        let mut file = PageFile::create(&path, config.page_size)?;

        let root_id = file.allocate_new_id();
        debug_assert_eq!(root_id, ROOT_PAGE_ID);
        file.flush(Page::new_leaf(root_id))?;

        tracing::info!(
            "created word tree at {} with {}-byte pages",
            path.display(),
            config.page_size
        );
        Ok(file)
    }

    /// The configuration this tree was opened with.
    #[must_use]
    pub const fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Page traffic since the tree was opened or the counters were reset.
    #[must_use]
    pub const fn io_stats(&self) -> IoStats {
        self.file.stats()
    }

    /// Zero the page traffic counters.
    pub fn reset_stats(&mut self) {
        self.file.reset_stats();
    }

    /// Sync both files to disk.
    pub fn sync(&self) -> Result<(), BTreeError> {
        self.file.sync()?;
        self.postings.sync()?;
        Ok(())
    }

    /// Number of keys in the tree, as recorded by the root.
    pub fn len(&mut self) -> Result<u64, BTreeError> {
        let root = self.file.fetch(ROOT_PAGE_ID)?;
        let count = root.subtree_key_count;
        self.file.free(root);
        Ok(count)
    }

    /// Whether the tree holds no keys.
    pub fn is_empty(&mut self) -> Result<bool, BTreeError> {
        Ok(self.len()? == 0)
    }

    /// Look up the posting reference stored for `key`.
    pub fn search(&mut self, key: &[u8]) -> Result<Option<PostingRef>, BTreeError> {
        let page = self.descend_to_leaf(ROOT_PAGE_ID, |node| node.child_for(key))?;
        let found = page
            .as_leaf()
            .and_then(|leaf| leaf.find(key).ok().map(|i| leaf.entries[i].posting));
        self.file.free(page);
        Ok(found)
    }

    /// Every text offset recorded for `key`, in insertion order.
    ///
    /// Returns an empty list for a key that is not in the tree.
    pub fn postings(&mut self, key: &[u8]) -> Result<Vec<TextPtr>, BTreeError> {
        match self.search(key)? {
            Some(posting) => Ok(self.postings.read(posting)?),
            None => Ok(Vec::new()),
        }
    }

    /// Every key in leaf chain order.
    pub fn leaf_keys(&mut self) -> Result<Vec<Vec<u8>>, BTreeError> {
        let first = self.first_leaf_id(ROOT_PAGE_ID)?;
        let mut keys = Vec::new();
        self.for_each_leaf(first, None, |_, leaf| {
            keys.extend(leaf.entries.iter().map(|e| e.key.clone()));
            Ok(())
        })?;
        Ok(keys)
    }

    /// Count the keys under `page_id` by walking the leaf chain.
    ///
    /// Follows the leftmost and rightmost paths to the subtree's first and
    /// last leaf and sums the key counts of every leaf in between. Ignores
    /// the stored subtree counts entirely.
    pub fn count_subtree_by_scan(&mut self, page_id: PageId) -> Result<u64, BTreeError> {
        let first = self.first_leaf_id(page_id)?;
        let last = self.last_leaf_id(page_id)?;
        let mut count = 0;
        self.for_each_leaf(first, Some(last), |page, _| {
            count += u64::from(page.key_count);
            Ok(())
        })?;
        Ok(count)
    }

    /// Check the structure of the whole tree.
    ///
    /// Recomputes every page's subtree count, checks that keys are strictly
    /// increasing within each page and respect the separators above them,
    /// and that the leaf chain yields every key in order. Returns the first
    /// violation found.
    pub fn verify(&mut self) -> Result<(), BTreeError> {
        let total = self.verify_page(ROOT_PAGE_ID, None, None)?;

        let first = self.first_leaf_id(ROOT_PAGE_ID)?;
        let mut chain_count = 0u64;
        let mut previous: Option<Vec<u8>> = None;
        self.for_each_leaf(first, None, |page, leaf| {
            for entry in &leaf.entries {
                if previous.as_deref().is_some_and(|p| p >= entry.key.as_slice()) {
                    return Err(BTreeError::UnorderedKeys {
                        page_id: page.page_id,
                    });
                }
                previous = Some(entry.key.clone());
            }
            chain_count += leaf.entries.len() as u64;
            Ok(())
        })?;

        if chain_count != total {
            return Err(BTreeError::CountMismatch {
                page_id: ROOT_PAGE_ID,
                expected: chain_count,
                actual: total,
            });
        }
        Ok(())
    }

    /// Write an indented rendition of every page, separators in key order.
    pub fn print_tree<W: Write>(&mut self, out: &mut W) -> Result<(), BTreeError> {
        self.print_page(ROOT_PAGE_ID, 0, out)
    }

    fn print_page<W: Write>(
        &mut self,
        page_id: PageId,
        depth: usize,
        out: &mut W,
    ) -> Result<(), BTreeError> {
        let page = self.file.fetch(page_id)?;
        let indent = "  ".repeat(depth);
        match &page.node {
            Node::Leaf(leaf) => {
                let keys: Vec<_> = leaf
                    .entries
                    .iter()
                    .map(|e| String::from_utf8_lossy(&e.key))
                    .collect();
                writeln!(
                    out,
                    "{indent}leaf {page_id} ({} keys): {}",
                    page.subtree_key_count,
                    keys.join(" ")
                )?;
            }
            Node::Internal(node) => {
                writeln!(
                    out,
                    "{indent}node {page_id} ({} keys)",
                    page.subtree_key_count
                )?;
                for entry in &node.entries {
                    self.print_page(entry.child_id, depth + 1, out)?;
                    writeln!(out, "{indent}<= {}", String::from_utf8_lossy(&entry.key))?;
                }
                self.print_page(node.rightmost_child_id, depth + 1, out)?;
            }
        }
        self.file.free(page);
        Ok(())
    }

    /// Recompute the key count under `page_id`, checking key bounds on the way.
    ///
    /// Every key must satisfy `lower < key <= upper`.
    fn verify_page(
        &mut self,
        page_id: PageId,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Result<u64, BTreeError> {
        let page = self.file.fetch(page_id)?;

        let keys = page.keys();
        let in_bounds = keys.iter().all(|&k| {
            lower.is_none_or(|l| k > l) && upper.is_none_or(|u| k <= u)
        });
        if !in_bounds || keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(BTreeError::UnorderedKeys { page_id });
        }

        let actual = match &page.node {
            Node::Leaf(leaf) => leaf.entries.len() as u64,
            Node::Internal(node) => {
                let mut sum = 0;
                let mut low = lower;
                for entry in &node.entries {
                    sum += self.verify_page(entry.child_id, low, Some(entry.key.as_slice()))?;
                    low = Some(entry.key.as_slice());
                }
                sum + self.verify_page(node.rightmost_child_id, low, upper)?
            }
        };

        if actual != page.subtree_key_count {
            return Err(BTreeError::CountMismatch {
                page_id,
                expected: actual,
                actual: page.subtree_key_count,
            });
        }
        self.file.free(page);
        Ok(actual)
    }

    /// Descend from `from` to a leaf, choosing each child with `pick`.
    ///
    /// Internal pages on the way are freed; the leaf is returned to the caller.
    pub(crate) fn descend_to_leaf(
        &mut self,
        from: PageId,
        pick: impl Fn(&InternalNode) -> PageId,
    ) -> Result<Page, BTreeError> {
        let mut page = self.file.fetch(from)?;
        while let Some(node) = page.as_internal() {
            let child = pick(node);
            self.file.free(page);
            page = self.file.fetch(child)?;
        }
        Ok(page)
    }

    /// Id of the leaf that holds (or would hold) `key`.
    pub(crate) fn leaf_id_for(&mut self, key: &[u8]) -> Result<PageId, BTreeError> {
        self.leaf_id_by(ROOT_PAGE_ID, |node| node.child_for(key))
    }

    fn first_leaf_id(&mut self, from: PageId) -> Result<PageId, BTreeError> {
        self.leaf_id_by(from, |node| node.child_at(0))
    }

    fn last_leaf_id(&mut self, from: PageId) -> Result<PageId, BTreeError> {
        self.leaf_id_by(from, |node| node.rightmost_child_id)
    }

    fn leaf_id_by(
        &mut self,
        from: PageId,
        pick: impl Fn(&InternalNode) -> PageId,
    ) -> Result<PageId, BTreeError> {
        let leaf = self.descend_to_leaf(from, pick)?;
        let page_id = leaf.page_id;
        self.file.free(leaf);
        Ok(page_id)
    }

    /// Visit leaves along the chain starting at `first`.
    ///
    /// Stops after `last` if given, otherwise at the end of the chain. A chain
    /// that ends before `last`, or that reaches a non-leaf page, is broken.
    pub(crate) fn for_each_leaf<F>(
        &mut self,
        first: PageId,
        last: Option<PageId>,
        mut visit: F,
    ) -> Result<(), BTreeError>
    where
        F: FnMut(&Page, &LeafNode) -> Result<(), BTreeError>,
    {
        let mut current = first;
        loop {
            let page = self.file.fetch(current)?;
            let leaf = page
                .as_leaf()
                .ok_or(BTreeError::BrokenLeafChain { page_id: current })?;
            visit(&page, leaf)?;

            let next = leaf.next_leaf_id;
            self.file.free(page);
            if last == Some(current) {
                return Ok(());
            }
            match (next, last) {
                (Some(next), _) => current = next,
                (None, None) => return Ok(()),
                (None, Some(_)) => return Err(BTreeError::BrokenLeafChain { page_id: current }),
            }
        }
    }

    /// Sum the stored subtree counts of the given pages, fetching each once.
    pub(crate) fn sum_subtree_counts(
        &mut self,
        page_ids: impl IntoIterator<Item = PageId>,
    ) -> Result<u64, BTreeError> {
        let mut sum = 0;
        for page_id in page_ids {
            let page = self.file.fetch(page_id)?;
            sum += page.subtree_key_count;
            self.file.free(page);
        }
        Ok(sum)
    }
}

impl<P: PostingsStore> std::fmt::Debug for WordTree<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordTree")
            .field("file", &self.file)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Errors returned by tree operations.
#[derive(Debug)]
pub enum BTreeError {
    /// Keys must have at least one byte.
    EmptyKey,
    /// Key longer than the configured maximum. Nothing was changed.
    KeyTooLong { len: usize, max: usize },
    /// Invalid configuration.
    Config(ConfigError),
    /// Page file error.
    File(FileError),
    /// Postings store error.
    Postings(PostingsError),
    /// I/O error outside the page and postings files.
    Io(std::io::Error),
    /// A stored subtree count disagrees with the keys below it.
    CountMismatch {
        page_id: PageId,
        expected: u64,
        actual: u64,
    },
    /// A split child is not where its parent points.
    BrokenChildPointer {
        page_id: PageId,
        expected_child: PageId,
    },
    /// Keys out of order within a page or outside their separators.
    UnorderedKeys { page_id: PageId },
    /// The leaf chain ends early or leads to a non-leaf page.
    BrokenLeafChain { page_id: PageId },
}

impl BTreeError {
    /// Whether the tree structure can no longer be trusted.
    ///
    /// Non-fatal errors reject a single operation and leave the tree intact.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::EmptyKey | Self::KeyTooLong { .. } | Self::Config(_) | Self::Io(_) => false,
            Self::File(e) => e.is_fatal(),
            Self::Postings(e) => matches!(
                e,
                PostingsError::Io(_)
                    | PostingsError::ChecksumMismatch { .. }
                    | PostingsError::InvalidRef(_)
            ),
            Self::CountMismatch { .. }
            | Self::BrokenChildPointer { .. }
            | Self::UnorderedKeys { .. }
            | Self::BrokenLeafChain { .. } => true,
        }
    }
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKey => write!(f, "empty key"),
            Self::KeyTooLong { len, max } => {
                write!(f, "key of {len} bytes exceeds the maximum of {max}")
            }
            Self::Config(e) => write!(f, "config error: {e}"),
            Self::File(e) => write!(f, "file error: {e}"),
            Self::Postings(e) => write!(f, "postings error: {e}"),
            Self::Io(e) => write!(f, "output error: {e}"),
            Self::CountMismatch {
                page_id,
                expected,
                actual,
            } => write!(
                f,
                "page {page_id} records {actual} keys in its subtree, found {expected}"
            ),
            Self::BrokenChildPointer {
                page_id,
                expected_child,
            } => write!(f, "page {page_id} has no pointer to split child {expected_child}"),
            Self::UnorderedKeys { page_id } => write!(f, "keys out of order in page {page_id}"),
            Self::BrokenLeafChain { page_id } => write!(f, "leaf chain broken at page {page_id}"),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::File(e) => Some(e),
            Self::Postings(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::EmptyKey
            | Self::KeyTooLong { .. }
            | Self::CountMismatch { .. }
            | Self::BrokenChildPointer { .. }
            | Self::UnorderedKeys { .. }
            | Self::BrokenLeafChain { .. } => None,
        }
    }
}

impl From<ConfigError> for BTreeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<FileError> for BTreeError {
    fn from(e: FileError) -> Self {
        Self::File(e)
    }
}

impl From<PostingsError> for BTreeError {
    fn from(e: PostingsError) -> Self {
        Self::Postings(e)
    }
}

impl From<std::io::Error> for BTreeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryPostings;
    use tempfile::tempdir;

    fn memory_tree(dir: &tempfile::TempDir, page_size: usize) -> WordTree<MemoryPostings> {
        let config = TreeConfig::new(page_size)
            .expect("valid config")
            .with_data_directory(dir.path().to_path_buf());
        WordTree::create_with_postings(config, MemoryPostings::new(4)).expect("create tree")
    }

    #[test]
    fn test_new_tree_is_empty_leaf() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 128);

        assert!(tree.is_empty().expect("len"));
        assert!(tree.leaf_keys().expect("leaf keys").is_empty());
        assert_eq!(tree.search(b"anything").expect("search"), None);
        assert!(tree.postings(b"anything").expect("postings").is_empty());
        tree.verify().expect("verify");
    }

    #[test]
    fn test_create_refuses_existing_tree() {
        let dir = tempdir().expect("create temp dir");
        let config = TreeConfig::new(128)
            .expect("valid config")
            .with_data_directory(dir.path().to_path_buf());
        let _tree = WordTree::create(config.clone()).expect("create tree");

        let err = WordTree::create(config).expect_err("tree exists");
        assert!(matches!(err, BTreeError::File(FileError::AlreadyExists(_))));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_store_io_errors_are_fatal() {
        let io = || std::io::Error::other("disk gone");
        assert!(BTreeError::File(FileError::Io(io())).is_fatal());
        assert!(BTreeError::Postings(PostingsError::Io(io())).is_fatal());
        // Failing to read an input file or write output leaves the tree alone.
        assert!(!BTreeError::Io(io()).is_fatal());
    }

    #[test]
    fn test_search_and_postings() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 128);
        for (offset, word) in ["the", "quick", "fox", "the", "lazy", "the"].iter().enumerate() {
            tree.insert(word.as_bytes(), offset as u64 * 10).expect("insert");
        }

        assert!(tree.search(b"fox").expect("search").is_some());
        assert_eq!(tree.search(b"dog").expect("search"), None);
        assert_eq!(tree.postings(b"the").expect("postings"), vec![0, 30, 50]);
        assert_eq!(tree.postings(b"quick").expect("postings"), vec![10]);
    }

    #[test]
    fn test_count_subtree_by_scan_matches_stored_counts() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 96);
        for i in 0..60u64 {
            tree.insert(format!("w{:03}", (i * 37) % 101).as_bytes(), i)
                .expect("insert");
        }

        let root = tree.file.fetch(ROOT_PAGE_ID).expect("fetch root");
        let children: Vec<PageId> = root
            .as_internal()
            .expect("root has split")
            .children()
            .collect();
        let root_count = root.subtree_key_count;
        tree.file.free(root);

        assert_eq!(
            tree.count_subtree_by_scan(ROOT_PAGE_ID).expect("scan"),
            root_count
        );
        for child in children {
            let page = tree.file.fetch(child).expect("fetch child");
            let stored = page.subtree_key_count;
            tree.file.free(page);
            assert_eq!(tree.count_subtree_by_scan(child).expect("scan"), stored);
        }
    }

    #[test]
    fn test_verify_detects_bad_count() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 96);
        for word in ["bob", "anna", "carl", "dan", "eve"] {
            tree.insert(word.as_bytes(), 0).expect("insert");
        }
        tree.verify().expect("verify");

        let mut root = tree.file.fetch(ROOT_PAGE_ID).expect("fetch root");
        root.subtree_key_count += 1;
        tree.file.flush(root).expect("flush root");

        let err = tree.verify().expect_err("count is wrong");
        assert!(matches!(
            err,
            BTreeError::CountMismatch {
                page_id: ROOT_PAGE_ID,
                expected: 5,
                actual: 6,
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_print_tree_lists_every_key() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 96);
        for word in ["bob", "anna", "carl", "dan", "eve"] {
            tree.insert(word.as_bytes(), 0).expect("insert");
        }

        let mut out = Vec::new();
        tree.print_tree(&mut out).expect("print tree");
        let text = String::from_utf8(out).expect("utf8");

        assert!(text.starts_with("node 1 (5 keys)"));
        assert!(text.contains("anna bob carl"));
        assert!(text.contains("<= carl"));
        assert!(text.contains("dan eve"));
    }

    #[test]
    fn test_stats_track_fetches() {
        let dir = tempdir().expect("create temp dir");
        let mut tree = memory_tree(&dir, 128);
        tree.insert(b"word", 1).expect("insert");

        tree.reset_stats();
        tree.search(b"word").expect("search");
        let stats = tree.io_stats();
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.frees, 1);
        assert_eq!(stats.writes, 0);
    }
}
