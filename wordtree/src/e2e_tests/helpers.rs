//! Common helpers for end-to-end tests.

use tempfile::TempDir;

use crate::btree::WordTree;
use crate::config::TreeConfig;
use crate::storage::{Page, PageId, ROOT_PAGE_ID};

/// A file-backed tree in its own temporary directory.
///
/// The directory, and both files in it, are removed on drop.
pub struct TestTree {
    pub tree: WordTree,
    pub config: TreeConfig,
    _dir: TempDir,
}

impl TestTree {
    /// Create an empty tree with the given page size.
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        #[allow(clippy::expect_used)]
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        #[allow(clippy::expect_used)]
        let config = TreeConfig::new(page_size)
            .expect("Invalid page size")
            .with_data_directory(dir.path().to_path_buf());
        #[allow(clippy::expect_used)]
        let tree = WordTree::create(config.clone()).expect("Failed to create tree");
        Self {
            tree,
            config,
            _dir: dir,
        }
    }

    /// Close the tree and open it again from disk.
    #[must_use]
    pub fn reopen(self) -> Self {
        let Self { tree, config, _dir } = self;
        #[allow(clippy::expect_used)]
        tree.sync().expect("Failed to sync tree");
        drop(tree);
        #[allow(clippy::expect_used)]
        let tree = WordTree::open(config.clone()).expect("Failed to reopen tree");
        Self { tree, config, _dir }
    }

    /// Insert each word once, using its position as the text offset.
    pub fn insert_all<S: AsRef<str>>(&mut self, words: impl IntoIterator<Item = S>) {
        for (offset, word) in words.into_iter().enumerate() {
            #[allow(clippy::expect_used)]
            self.tree
                .insert(word.as_ref().as_bytes(), offset as u64)
                .expect("Failed to insert");
        }
    }

    /// Range count, checked against the leaf chain scan.
    pub fn count(&mut self, lo: &str, hi: &str) -> u64 {
        #[allow(clippy::expect_used)]
        let fast = self
            .tree
            .count_in_range(lo.as_bytes(), hi.as_bytes())
            .expect("Failed to count range");
        #[allow(clippy::expect_used)]
        let slow = self
            .tree
            .count_in_range_by_scan(lo.as_bytes(), hi.as_bytes())
            .expect("Failed to scan range");
        assert_eq!(fast, slow, "range count disagrees with leaf scan for {lo}..={hi}");
        fast
    }

    /// Fetch a page for inspection.
    pub fn page(&mut self, page_id: PageId) -> Page {
        #[allow(clippy::expect_used)]
        self.tree.file.fetch(page_id).expect("Failed to fetch page")
    }

    /// Fetch the root page.
    pub fn root(&mut self) -> Page {
        self.page(ROOT_PAGE_ID)
    }

    /// Every key in leaf chain order, as strings.
    pub fn leaf_keys(&mut self) -> Vec<String> {
        #[allow(clippy::expect_used)]
        self.tree
            .leaf_keys()
            .expect("Failed to list keys")
            .into_iter()
            .map(|k| String::from_utf8_lossy(&k).into_owned())
            .collect()
    }
}

// =============================================================================
// Key Generation
// =============================================================================

/// Zero-padded numeric keys, e.g. `numeric_keys(1..=3, 6)` gives
/// `"000001"`, `"000002"`, `"000003"`.
#[must_use]
pub fn numeric_keys(range: impl IntoIterator<Item = u64>, width: usize) -> Vec<String> {
    range.into_iter().map(|i| format!("{i:0width$}")).collect()
}
