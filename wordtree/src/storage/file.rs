//! Page file I/O operations.
//!
//! This module reads and writes tree pages to the page file. Pages live in
//! fixed-size slots: page `n` occupies bytes `[(n - 1) * page_size, n * page_size)`,
//! so page 1 (the root) is slot 0. There is no file header.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::page::{Page, PageError, PageId};

/// Counters of page traffic since the file was opened or the counters reset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoStats {
    /// Pages fetched from the file.
    pub reads: u64,
    /// Pages flushed to the file.
    pub writes: u64,
    /// Fetched pages discarded without writing.
    pub frees: u64,
}

/// A page file handle.
///
/// Pages are not cached: every `fetch` reads the slot again and returns an
/// owned `Page`, which the caller must hand back to `flush` or `free`.
pub struct PageFile {
    file: File,
    page_size: usize,
    /// Highest page id handed out so far.
    total_pages: u64,
    stats: IoStats,
}

impl PageFile {
    /// Create a new, empty page file at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path, page_size: usize) -> Result<Self, FileError> {
        if path.exists() {
            return Err(FileError::AlreadyExists(path.to_path_buf()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(FileError::Io)?;

        Ok(Self {
            file,
            page_size,
            total_pages: 0,
            stats: IoStats::default(),
        })
    }

    /// Open an existing page file.
    ///
    /// `page_size` must be the size the file was created with.
    pub fn open(path: &Path, page_size: usize) -> Result<Self, FileError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(FileError::Io)?;

        let len = file.metadata().map_err(FileError::Io)?.len();
        let slot = page_size as u64;
        if len % slot != 0 {
            return Err(FileError::NotPageAligned {
                len,
                page_size,
            });
        }

        Ok(Self {
            file,
            page_size,
            total_pages: len / slot,
            stats: IoStats::default(),
        })
    }

    /// Capacity of one page in bytes.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Highest page id allocated so far.
    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        self.total_pages
    }

    /// Page traffic counters.
    #[must_use]
    pub const fn stats(&self) -> IoStats {
        self.stats
    }

    /// Zero the page traffic counters.
    pub fn reset_stats(&mut self) {
        self.stats = IoStats::default();
    }

    /// Hand out a fresh page id, distinct from every id handed out before.
    ///
    /// The slot is written by the first `flush` of a page with this id.
    pub const fn allocate_new_id(&mut self) -> PageId {
        self.total_pages += 1;
        self.total_pages
    }

    /// Whether `page` in its current state fits in one slot.
    #[must_use]
    pub fn fits(&self, page: &Page) -> bool {
        page.encoded_size() <= self.page_size
    }

    /// Read a page from the file.
    ///
    /// Fails with `PageOutOfRange` if `page_id` was never allocated,
    /// `CorruptPage` if the slot holds a different page, and
    /// `InvalidPageTag` if the slot's tag is neither leaf nor internal.
    pub fn fetch(&mut self, page_id: PageId) -> Result<Page, FileError> {
        if page_id < 1 || page_id > self.total_pages {
            tracing::warn!(
                "fetch of page {page_id} out of range (1, {})",
                self.total_pages
            );
            return Err(FileError::PageOutOfRange {
                page_id,
                total_pages: self.total_pages,
            });
        }

        let mut buf = vec![0u8; self.page_size];
        self.file
            .seek(SeekFrom::Start(self.offset_of(page_id)))
            .map_err(FileError::Io)?;
        self.file.read_exact(&mut buf).map_err(FileError::Io)?;
        self.stats.reads += 1;

        let found = Page::peek_id(&buf).map_err(|source| FileError::Decode { page_id, source })?;
        if found != page_id {
            return Err(FileError::CorruptPage {
                expected: page_id,
                found,
            });
        }

        Page::decode(&buf).map_err(|source| match source {
            PageError::InvalidPageTag(tag) => FileError::InvalidPageTag { page_id, tag },
            source => FileError::Decode { page_id, source },
        })
    }

    /// Write a page to its slot, growing the file if the id is new.
    ///
    /// `byte_size` and `key_count` are recomputed from the entries first.
    pub fn flush(&mut self, mut page: Page) -> Result<(), FileError> {
        let page_id = page.page_id;
        if page_id < 1 {
            return Err(FileError::PageOutOfRange {
                page_id,
                total_pages: self.total_pages,
            });
        }

        page.refresh_header();
        if page.byte_size as usize > self.page_size {
            return Err(FileError::PageOverflow {
                page_id,
                byte_size: page.byte_size as usize,
                capacity: self.page_size,
            });
        }

        let mut buf = vec![0u8; self.page_size];
        page.encode_into(&mut buf)
            .map_err(|source| FileError::Decode { page_id, source })?;

        self.file
            .seek(SeekFrom::Start(self.offset_of(page_id)))
            .map_err(FileError::Io)?;
        self.file.write_all(&buf).map_err(FileError::Io)?;
        self.stats.writes += 1;

        if page_id > self.total_pages {
            self.total_pages = page_id;
        }
        Ok(())
    }

    /// Discard a fetched page without writing it.
    pub fn free(&mut self, page: Page) {
        self.stats.frees += 1;
        drop(page);
    }

    /// Sync all pending writes to disk.
    pub fn sync(&self) -> Result<(), FileError> {
        self.file.sync_all().map_err(FileError::Io)
    }

    const fn offset_of(&self, page_id: PageId) -> u64 {
        (page_id - 1) * self.page_size as u64
    }
}

impl std::fmt::Debug for PageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFile")
            .field("page_size", &self.page_size)
            .field("total_pages", &self.total_pages)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Errors that can occur during page file operations.
#[derive(Debug)]
pub enum FileError {
    /// I/O error.
    Io(std::io::Error),
    /// File already exists.
    AlreadyExists(PathBuf),
    /// File length is not a whole number of pages.
    NotPageAligned { len: u64, page_size: usize },
    /// Page id outside `[1, total_pages]`.
    PageOutOfRange { page_id: PageId, total_pages: u64 },
    /// The slot for `expected` holds a page with a different id.
    CorruptPage { expected: PageId, found: PageId },
    /// The page tag is neither leaf nor internal.
    InvalidPageTag { page_id: PageId, tag: u8 },
    /// The page does not fit in its slot.
    PageOverflow {
        page_id: PageId,
        byte_size: usize,
        capacity: usize,
    },
    /// The page record could not be encoded or decoded.
    Decode { page_id: PageId, source: PageError },
}

impl FileError {
    /// Whether the error means the tree structure can no longer be trusted.
    ///
    /// A failed read or write may leave a split half-written, so I/O errors
    /// on the page file are fatal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Io(_)
            | Self::CorruptPage { .. }
            | Self::InvalidPageTag { .. }
            | Self::Decode { .. }
            | Self::PageOverflow { .. } => true,
            Self::AlreadyExists(_)
            | Self::NotPageAligned { .. }
            | Self::PageOutOfRange { .. } => false,
        }
    }
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::AlreadyExists(p) => write!(f, "file already exists: {}", p.display()),
            Self::NotPageAligned { len, page_size } => {
                write!(f, "file length {len} is not a multiple of page size {page_size}")
            }
            Self::PageOutOfRange {
                page_id,
                total_pages,
            } => write!(f, "page {page_id} out of range (1, {total_pages})"),
            Self::CorruptPage { expected, found } => {
                write!(f, "corrupted page {expected}: slot holds page {found}")
            }
            Self::InvalidPageTag { page_id, tag } => {
                write!(f, "illegal page type 0x{tag:02x} in page {page_id}")
            }
            Self::PageOverflow {
                page_id,
                byte_size,
                capacity,
            } => write!(
                f,
                "page {page_id} needs {byte_size} bytes but pages hold {capacity}"
            ),
            Self::Decode { page_id, source } => write!(f, "page {page_id}: {source}"),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Decode { source, .. } => Some(source),
            Self::AlreadyExists(_)
            | Self::NotPageAligned { .. }
            | Self::PageOutOfRange { .. }
            | Self::CorruptPage { .. }
            | Self::InvalidPageTag { .. }
            | Self::PageOverflow { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::{LeafEntry, Node};
    use crate::storage::postings::PostingRef;
    use tempfile::tempdir;

    const PAGE_SIZE: usize = 128;

    fn leaf(page_id: PageId, keys: &[&str]) -> Page {
        let mut page = Page::new_leaf(page_id);
        if let Node::Leaf(node) = &mut page.node {
            for (i, key) in keys.iter().enumerate() {
                node.entries.push(LeafEntry {
                    key: key.as_bytes().to_vec(),
                    posting: PostingRef::new(i as u64),
                });
            }
        }
        page.subtree_key_count = keys.len() as u64;
        page
    }

    #[test]
    fn test_create_and_open() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("B-TREE_FILE");

        {
            let mut file = PageFile::create(&path, PAGE_SIZE).expect("create file");
            assert_eq!(file.total_pages(), 0);
            let id = file.allocate_new_id();
            assert_eq!(id, 1);
            file.flush(leaf(id, &["anna"])).expect("flush");
            file.sync().expect("sync");
        }

        let mut file = PageFile::open(&path, PAGE_SIZE).expect("open file");
        assert_eq!(file.total_pages(), 1);
        let page = file.fetch(1).expect("fetch");
        assert_eq!(page.key_count, 1);
        assert_eq!(page.subtree_key_count, 1);
    }

    #[test]
    fn test_create_already_exists() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("B-TREE_FILE");
        std::fs::write(&path, b"existing").expect("write file");

        let result = PageFile::create(&path, PAGE_SIZE);
        assert!(matches!(result, Err(FileError::AlreadyExists(_))));
    }

    #[test]
    fn test_open_rejects_misaligned_file() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("B-TREE_FILE");
        std::fs::write(&path, vec![0u8; PAGE_SIZE + 1]).expect("write file");

        let result = PageFile::open(&path, PAGE_SIZE);
        assert!(matches!(result, Err(FileError::NotPageAligned { .. })));
    }

    #[test]
    fn test_allocate_is_monotonic() {
        let dir = tempdir().expect("create temp dir");
        let mut file = PageFile::create(&dir.path().join("f"), PAGE_SIZE).expect("create file");

        let ids: Vec<PageId> = (0..5).map(|_| file.allocate_new_id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_flush_recomputes_derived_fields() {
        let dir = tempdir().expect("create temp dir");
        let mut file = PageFile::create(&dir.path().join("f"), PAGE_SIZE).expect("create file");
        let id = file.allocate_new_id();

        let mut page = leaf(id, &["anna", "bob"]);
        page.byte_size = 9999;
        page.key_count = 77;
        file.flush(page).expect("flush");

        let page = file.fetch(id).expect("fetch");
        assert_eq!(page.key_count, 2);
        assert_eq!(page.byte_size as usize, page.encoded_size());
    }

    #[test]
    fn test_fetch_out_of_range() {
        let dir = tempdir().expect("create temp dir");
        let mut file = PageFile::create(&dir.path().join("f"), PAGE_SIZE).expect("create file");
        let id = file.allocate_new_id();
        file.flush(leaf(id, &[])).expect("flush");

        assert!(matches!(
            file.fetch(0),
            Err(FileError::PageOutOfRange { page_id: 0, .. })
        ));
        let err = file.fetch(2).expect_err("page 2 was never allocated");
        assert!(matches!(err, FileError::PageOutOfRange { page_id: 2, total_pages: 1 }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_io_errors_are_fatal() {
        let err = FileError::Io(std::io::Error::other("disk gone"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_fetch_detects_wrong_page_id() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("f");
        let mut file = PageFile::create(&path, PAGE_SIZE).expect("create file");
        for _ in 0..2 {
            let id = file.allocate_new_id();
            file.flush(leaf(id, &["x"])).expect("flush");
        }

        // Overwrite the id field of page 2 (slot 1, byte 1).
        let mut bytes = std::fs::read(&path).expect("read file");
        bytes[PAGE_SIZE + 1] = 5;
        std::fs::write(&path, &bytes).expect("write file");

        let mut file = PageFile::open(&path, PAGE_SIZE).expect("open file");
        let err = file.fetch(2).expect_err("slot holds page 5");
        assert!(matches!(err, FileError::CorruptPage { expected: 2, found: 5 }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_fetch_detects_invalid_tag() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("f");
        let mut file = PageFile::create(&path, PAGE_SIZE).expect("create file");
        let id = file.allocate_new_id();
        file.flush(leaf(id, &["x"])).expect("flush");

        let mut bytes = std::fs::read(&path).expect("read file");
        bytes[0] = b'?';
        std::fs::write(&path, &bytes).expect("write file");

        let mut file = PageFile::open(&path, PAGE_SIZE).expect("open file");
        let err = file.fetch(1).expect_err("tag is invalid");
        assert!(matches!(err, FileError::InvalidPageTag { page_id: 1, tag: b'?' }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_flush_refuses_oversized_page() {
        let dir = tempdir().expect("create temp dir");
        let mut file = PageFile::create(&dir.path().join("f"), 64).expect("create file");
        let id = file.allocate_new_id();

        let page = leaf(id, &["abcdefghij", "klmnopqrst"]);
        assert!(!file.fits(&page));
        assert!(matches!(
            file.flush(page),
            Err(FileError::PageOverflow { capacity: 64, .. })
        ));
    }

    #[test]
    fn test_stats_count_traffic() {
        let dir = tempdir().expect("create temp dir");
        let mut file = PageFile::create(&dir.path().join("f"), PAGE_SIZE).expect("create file");
        let id = file.allocate_new_id();
        file.flush(leaf(id, &["a"])).expect("flush");

        let page = file.fetch(id).expect("fetch");
        file.free(page);
        let page = file.fetch(id).expect("fetch");
        file.flush(page).expect("flush");

        assert_eq!(
            file.stats(),
            IoStats {
                reads: 2,
                writes: 2,
                frees: 1,
            }
        );

        file.reset_stats();
        assert_eq!(file.stats(), IoStats::default());
    }
}
