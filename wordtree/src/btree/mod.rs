//! Order-statistics B+-tree over words.
//!
//! Every page records the number of keys in its subtree, which lets range
//! counts skip whole subtrees instead of scanning leaves.
//!
//! # Structure
//!
//! - Internal pages: separator keys, each with the child holding keys less
//!   than or equal to it, plus a rightmost child for everything greater
//! - Leaf pages: keys with posting references, singly linked in key order
//!
//! Page 1 is always the root.
//!
//! # Usage
//!
//! ```ignore
//! use wordtree::{TreeConfig, WordTree};
//!
//! let mut tree = WordTree::create(TreeConfig::default())?;
//! tree.insert(b"anna", 0)?;
//! tree.insert(b"bob", 17)?;
//! assert_eq!(tree.count_in_range(b"a", b"b")?, 1);
//! ```

mod insert;
mod range;
mod tree;

pub use tree::{BTreeError, WordTree};
