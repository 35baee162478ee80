//! Word index storage.
//!
//! Two files live in the data directory:
//!
//! - `B-TREE_FILE`: tree pages in fixed-size slots, page 1 is the root
//! - `POSTINGSFILE`: chained blocks of text pointers, one chain per key
//!
//! # Usage
//!
//! ```ignore
//! use storage::{Page, PageFile};
//!
//! let mut file = PageFile::create(path, 1024)?;
//! let root_id = file.allocate_new_id();
//! file.flush(Page::new_leaf(root_id))?;
//!
//! let root = file.fetch(root_id)?;
//! file.free(root);
//! ```

mod file;
mod page;
mod postings;

pub use file::{FileError, IoStats, PageFile};
pub use page::{
    CHILD_FIELD_SIZE, InternalEntry, InternalNode, KEY_LEN_FIELD_SIZE, LeafEntry, LeafNode, Node,
    PAGE_HEADER_SIZE, POSTING_FIELD_SIZE, Page, PageError, PageId, PageKind, ROOT_PAGE_ID, UpKey,
};
pub use postings::{
    FilePostings, MemoryPostings, PostingRef, PostingsError, PostingsStore, TextPtr,
};
