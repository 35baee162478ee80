// Life of a word:
// 1. Text comes in through the shell (`i <file>`)
// 2. The tokenizer splits it into lower-case words with their byte offsets
// 3. Each (word, offset) pair is inserted:
//     - Descend to the leaf covering the word
//     - New word: create a posting, add the key, split full pages upward
//     - Known word: append the offset to its posting
//    For a new word every page on the path gains one in its subtree count.
// 4. Range queries (`r lo hi`) read the subtree counts instead of the leaves.
//
// System components:
//  - Page file (fixed-size slots, page 1 is the root)
//  - Postings file (chained blocks of text offsets)
//  - Word tree (insertion, lookup and range counting over both files)

pub mod btree;
pub mod config;
pub mod storage;
pub mod tokenize;

mod e2e_tests;

pub use btree::{BTreeError, WordTree};
pub use config::{ConfigError, TreeConfig};
