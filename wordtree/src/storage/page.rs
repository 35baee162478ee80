//! Tree pages and their on-disk encoding.
//!
//! Every page occupies one fixed-size slot of the page file. The record is
//! written at the start of the slot and the remainder is zero.
//!
//! # Page Format
//!
//! All integers are little-endian. Fields marked `[leaf]` or `[internal]` are
//! only present for that page kind, so the tag must be read first.
//!
//! ```text
//! +-----+---------+----------------+-----------+-----------+---------------+----------------------+
//! | tag | page id | [leaf] next id | byte size | key count | subtree count | [internal] rightmost |
//! | u8  | u64     | u64            | u32       | u32       | u64           | u64                  |
//! +-----+---------+----------------+-----------+-----------+---------------+----------------------+
//! ```
//!
//! followed by `key count` entries:
//!
//! ```text
//! +---------------------+---------+-----------+----------------+
//! | [internal] child id | key len | key bytes | [leaf] posting |
//! | u64                 | u16     | key len   | u64            |
//! +---------------------+---------+-----------+----------------+
//! ```
//!
//! A missing page id ("none") is encoded as 0; real page ids start at 1.

#![allow(clippy::cast_possible_truncation)]

use crate::storage::postings::PostingRef;

/// A page identifier. Page 1 is always the root.
pub type PageId = u64;

/// Id of the root page.
pub const ROOT_PAGE_ID: PageId = 1;

/// Encoding of "no page".
const NULL_PAGE_ID: PageId = 0;

/// Size of the fixed header for either page kind.
///
/// Leaf: tag (1) + id (8) + next leaf (8) + byte size (4) + key count (4) + subtree count (8).
/// Internal: tag (1) + id (8) + byte size (4) + key count (4) + subtree count (8) + rightmost (8).
pub const PAGE_HEADER_SIZE: usize = 33;

/// Size of the posting reference stored with each leaf entry.
pub const POSTING_FIELD_SIZE: usize = 8;

/// Size of the key length prefix of every entry.
pub const KEY_LEN_FIELD_SIZE: usize = 2;

/// Size of the child id stored with each internal entry.
pub const CHILD_FIELD_SIZE: usize = 8;

/// Page kind, stored as the first byte of every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageKind {
    Leaf = b'L',
    Internal = b'N',
}

impl TryFrom<u8> for PageKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'L' => Ok(Self::Leaf),
            b'N' => Ok(Self::Internal),
            _ => Err(value),
        }
    }
}

/// A key stored in a leaf together with its posting reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    pub key: Vec<u8>,
    pub posting: PostingRef,
}

/// A separator key in an internal page.
///
/// `child_id` holds every key less than or equal to `key` and greater than
/// the previous entry's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalEntry {
    pub key: Vec<u8>,
    pub child_id: PageId,
}

/// The separator produced when a page splits.
///
/// `left` keeps keys `<= key`, `right` holds keys `> key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpKey {
    pub left: PageId,
    pub right: PageId,
    pub key: Vec<u8>,
}

/// Leaf page contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeafNode {
    /// Next leaf in key order, `None` for the last leaf.
    pub next_leaf_id: Option<PageId>,
    /// Entries in strictly increasing key order.
    pub entries: Vec<LeafEntry>,
}

impl LeafNode {
    /// Locate `key`: `Ok(i)` if present at `i`, `Err(i)` for its insertion position.
    pub fn find(&self, key: &[u8]) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.as_slice().cmp(key))
    }

    /// Number of entries with `key >= lo`.
    #[must_use]
    pub fn count_at_least(&self, lo: &[u8]) -> u64 {
        let first = self.entries.partition_point(|e| e.key.as_slice() < lo);
        (self.entries.len() - first) as u64
    }

    /// Number of entries with `key <= hi`.
    #[must_use]
    pub fn count_at_most(&self, hi: &[u8]) -> u64 {
        self.entries.partition_point(|e| e.key.as_slice() <= hi) as u64
    }

    /// Number of entries with `lo <= key <= hi`.
    #[must_use]
    pub fn count_between(&self, lo: &[u8], hi: &[u8]) -> u64 {
        let first = self.entries.partition_point(|e| e.key.as_slice() < lo);
        self.entries[first..]
            .iter()
            .take_while(|e| e.key.as_slice() <= hi)
            .count() as u64
    }
}

/// Internal page contents.
///
/// The children, in key order, are every entry's `child_id` followed by
/// `rightmost_child_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    /// Child holding keys greater than every key in `entries`.
    pub rightmost_child_id: PageId,
    /// Separators in strictly increasing key order.
    pub entries: Vec<InternalEntry>,
}

impl InternalNode {
    /// Index of the child whose range covers `key`.
    ///
    /// The first entry whose key is `>= key` wins, so a key equal to a
    /// separator goes to the separator's own (left) child. Returns
    /// `entries.len()` for the rightmost child.
    #[must_use]
    pub fn child_index_for(&self, key: &[u8]) -> usize {
        self.entries.partition_point(|e| e.key.as_slice() < key)
    }

    /// Id of the child covering `key`.
    #[must_use]
    pub fn child_for(&self, key: &[u8]) -> PageId {
        self.child_at(self.child_index_for(key))
    }

    /// Id of the child at `index`, where `entries.len()` is the rightmost child.
    #[must_use]
    pub fn child_at(&self, index: usize) -> PageId {
        self.entries
            .get(index)
            .map_or(self.rightmost_child_id, |e| e.child_id)
    }

    /// Number of children, including the rightmost one.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.entries.len() + 1
    }

    /// Iterate over every child id in key order.
    pub fn children(&self) -> impl Iterator<Item = PageId> + '_ {
        self.entries
            .iter()
            .map(|e| e.child_id)
            .chain(std::iter::once(self.rightmost_child_id))
    }

    /// Insert the separator produced by splitting one of this page's children.
    ///
    /// The new entry points at `up.left`, and the pointer that used to name
    /// `up.left` (the following entry or the rightmost pointer) is repointed
    /// to `up.right`. Returns `false` without modifying the page if that
    /// pointer does not name `up.left`.
    pub fn insert_separator(&mut self, up: UpKey) -> bool {
        let position = self.child_index_for(&up.key);
        if self.child_at(position) != up.left {
            return false;
        }

        match self.entries.get_mut(position) {
            Some(following) => following.child_id = up.right,
            None => self.rightmost_child_id = up.right,
        }
        self.entries.insert(
            position,
            InternalEntry {
                key: up.key,
                child_id: up.left,
            },
        );
        true
    }
}

/// Page contents by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

/// One page of the tree.
///
/// `byte_size` and `key_count` are derived from the entries; they are
/// recomputed by `refresh_header` before every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub page_id: PageId,
    pub byte_size: u32,
    pub key_count: u32,
    /// Total number of keys in the subtree rooted at this page.
    pub subtree_key_count: u64,
    pub node: Node,
}

impl Page {
    /// Create an empty leaf page.
    #[must_use]
    pub fn new_leaf(page_id: PageId) -> Self {
        let mut page = Self {
            page_id,
            byte_size: 0,
            key_count: 0,
            subtree_key_count: 0,
            node: Node::Leaf(LeafNode::default()),
        };
        page.refresh_header();
        page
    }

    /// Create an internal page with a single separator.
    #[must_use]
    pub fn new_internal(page_id: PageId, up: UpKey, subtree_key_count: u64) -> Self {
        let mut page = Self {
            page_id,
            byte_size: 0,
            key_count: 0,
            subtree_key_count,
            node: Node::Internal(InternalNode {
                rightmost_child_id: up.right,
                entries: vec![InternalEntry {
                    key: up.key,
                    child_id: up.left,
                }],
            }),
        };
        page.refresh_header();
        page
    }

    /// The kind tag of this page.
    #[must_use]
    pub const fn kind(&self) -> PageKind {
        match self.node {
            Node::Leaf(_) => PageKind::Leaf,
            Node::Internal(_) => PageKind::Internal,
        }
    }

    /// Number of entries stored directly in this page.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.node {
            Node::Leaf(leaf) => leaf.entries.len(),
            Node::Internal(internal) => internal.entries.len(),
        }
    }

    /// Whether the page holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every key stored directly in this page, in page order.
    #[must_use]
    pub fn keys(&self) -> Vec<&[u8]> {
        match &self.node {
            Node::Leaf(leaf) => leaf.entries.iter().map(|e| e.key.as_slice()).collect(),
            Node::Internal(internal) => internal.entries.iter().map(|e| e.key.as_slice()).collect(),
        }
    }

    /// The leaf contents, if this is a leaf page.
    #[must_use]
    pub const fn as_leaf(&self) -> Option<&LeafNode> {
        match &self.node {
            Node::Leaf(leaf) => Some(leaf),
            Node::Internal(_) => None,
        }
    }

    /// The internal contents, if this is an internal page.
    #[must_use]
    pub const fn as_internal(&self) -> Option<&InternalNode> {
        match &self.node {
            Node::Leaf(_) => None,
            Node::Internal(internal) => Some(internal),
        }
    }

    /// Serialized size of this page computed from its entries.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        let entries: usize = match &self.node {
            Node::Leaf(leaf) => leaf
                .entries
                .iter()
                .map(|e| KEY_LEN_FIELD_SIZE + e.key.len() + POSTING_FIELD_SIZE)
                .sum(),
            Node::Internal(internal) => internal
                .entries
                .iter()
                .map(|e| CHILD_FIELD_SIZE + KEY_LEN_FIELD_SIZE + e.key.len())
                .sum(),
        };
        PAGE_HEADER_SIZE + entries
    }

    /// Recompute `byte_size` and `key_count` from the entries.
    pub fn refresh_header(&mut self) {
        self.byte_size = self.encoded_size() as u32;
        self.key_count = self.len() as u32;
    }

    /// Serialize the page into `buf`, zero-filling the rest of the slot.
    ///
    /// Uses the current `byte_size` and `key_count` fields as written.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<(), PageError> {
        let size = self.encoded_size();
        if size > buf.len() {
            return Err(PageError::Truncated {
                needed: size,
                available: buf.len(),
            });
        }

        let mut writer = PageWriter::new(buf);
        writer.put_u8(self.kind() as u8);
        writer.put_u64(self.page_id);
        if let Node::Leaf(leaf) = &self.node {
            writer.put_u64(leaf.next_leaf_id.unwrap_or(NULL_PAGE_ID));
        }
        writer.put_u32(self.byte_size);
        writer.put_u32(self.key_count);
        writer.put_u64(self.subtree_key_count);
        match &self.node {
            Node::Leaf(leaf) => {
                for entry in &leaf.entries {
                    writer.put_key(&entry.key)?;
                    writer.put_u64(entry.posting.get());
                }
            }
            Node::Internal(internal) => {
                writer.put_u64(internal.rightmost_child_id);
                for entry in &internal.entries {
                    writer.put_u64(entry.child_id);
                    writer.put_key(&entry.key)?;
                }
            }
        }
        writer.zero_rest();
        Ok(())
    }

    /// Read only the page id field of an encoded page.
    pub fn peek_id(bytes: &[u8]) -> Result<PageId, PageError> {
        let mut reader = PageReader::new(bytes);
        reader.skip(1)?;
        reader.get_u64()
    }

    /// Deserialize a page.
    ///
    /// Fields are read strictly in format order since the presence of the
    /// next-leaf and rightmost-child fields depends on the tag.
    pub fn decode(bytes: &[u8]) -> Result<Self, PageError> {
        let mut reader = PageReader::new(bytes);
        let kind = PageKind::try_from(reader.get_u8()?).map_err(PageError::InvalidPageTag)?;
        let page_id = reader.get_u64()?;
        let next_leaf_id = match kind {
            PageKind::Leaf => Some(reader.get_u64()?).filter(|&id| id != NULL_PAGE_ID),
            PageKind::Internal => None,
        };
        let byte_size = reader.get_u32()?;
        let key_count = reader.get_u32()?;
        let subtree_key_count = reader.get_u64()?;

        let node = match kind {
            PageKind::Leaf => {
                let count = reader.entry_count(key_count, KEY_LEN_FIELD_SIZE + POSTING_FIELD_SIZE)?;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = reader.get_key()?;
                    let posting = PostingRef::new(reader.get_u64()?);
                    entries.push(LeafEntry { key, posting });
                }
                Node::Leaf(LeafNode {
                    next_leaf_id,
                    entries,
                })
            }
            PageKind::Internal => {
                let rightmost_child_id = reader.get_u64()?;
                let count = reader.entry_count(key_count, KEY_LEN_FIELD_SIZE + CHILD_FIELD_SIZE)?;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let child_id = reader.get_u64()?;
                    let key = reader.get_key()?;
                    entries.push(InternalEntry { key, child_id });
                }
                Node::Internal(InternalNode {
                    rightmost_child_id,
                    entries,
                })
            }
        };

        let page = Self {
            page_id,
            byte_size,
            key_count,
            subtree_key_count,
            node,
        };
        let computed = page.encoded_size();
        if computed != byte_size as usize {
            return Err(PageError::SizeMismatch {
                stored: byte_size,
                computed,
            });
        }
        Ok(page)
    }
}

/// Sequential little-endian writer over a page slot.
struct PageWriter<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> PageWriter<'a> {
    const fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();
    }

    fn put_u8(&mut self, value: u8) {
        self.put_bytes(&[value]);
    }

    fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_le_bytes());
    }

    fn put_u64(&mut self, value: u64) {
        self.put_bytes(&value.to_le_bytes());
    }

    fn put_key(&mut self, key: &[u8]) -> Result<(), PageError> {
        let len = u16::try_from(key.len()).map_err(|_| PageError::KeyTooLarge(key.len()))?;
        self.put_bytes(&len.to_le_bytes());
        self.put_bytes(key);
        Ok(())
    }

    fn zero_rest(&mut self) {
        self.buf[self.offset..].fill(0);
    }
}

/// Sequential little-endian reader over a page slot.
struct PageReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> PageReader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PageError> {
        let end = self.offset + len;
        let slice = self.bytes.get(self.offset..end).ok_or(PageError::Truncated {
            needed: end,
            available: self.bytes.len(),
        })?;
        self.offset = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), PageError> {
        self.take(len).map(|_| ())
    }

    fn get_u8(&mut self) -> Result<u8, PageError> {
        Ok(self.take(1)?[0])
    }

    fn get_u16(&mut self) -> Result<u16, PageError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn get_u32(&mut self) -> Result<u32, PageError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn get_u64(&mut self) -> Result<u64, PageError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Check that `count` entries of at least `min_entry_size` bytes each can
    /// still fit in the slot.
    fn entry_count(&self, count: u32, min_entry_size: usize) -> Result<usize, PageError> {
        let count = count as usize;
        let needed = count
            .saturating_mul(min_entry_size)
            .saturating_add(self.offset);
        if needed > self.bytes.len() {
            return Err(PageError::Truncated {
                needed,
                available: self.bytes.len(),
            });
        }
        Ok(count)
    }

    fn get_key(&mut self) -> Result<Vec<u8>, PageError> {
        let len = self.get_u16()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

/// Errors related to page encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// Tag byte is neither leaf nor internal.
    InvalidPageTag(u8),
    /// The record runs past the end of its slot.
    Truncated { needed: usize, available: usize },
    /// Stored byte size disagrees with the decoded entries.
    SizeMismatch { stored: u32, computed: usize },
    /// Key too large for the key length field.
    KeyTooLarge(usize),
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPageTag(v) => write!(f, "invalid page tag: 0x{v:02x}"),
            Self::Truncated { needed, available } => {
                write!(f, "page record needs {needed} bytes, slot has {available}")
            }
            Self::SizeMismatch { stored, computed } => {
                write!(f, "stored byte size {stored} does not match computed size {computed}")
            }
            Self::KeyTooLarge(len) => write!(f, "key of {len} bytes cannot be encoded"),
        }
    }
}

impl std::error::Error for PageError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with(keys: &[&str]) -> Page {
        let mut page = Page::new_leaf(7);
        if let Node::Leaf(leaf) = &mut page.node {
            leaf.next_leaf_id = Some(9);
            for (i, key) in keys.iter().enumerate() {
                leaf.entries.push(LeafEntry {
                    key: key.as_bytes().to_vec(),
                    posting: PostingRef::new(100 + i as u64),
                });
            }
        }
        page.subtree_key_count = keys.len() as u64;
        page.refresh_header();
        page
    }

    fn internal_with(keys: &[&str], children: &[PageId]) -> InternalNode {
        InternalNode {
            rightmost_child_id: children[keys.len()],
            entries: keys
                .iter()
                .zip(children)
                .map(|(key, &child_id)| InternalEntry {
                    key: key.as_bytes().to_vec(),
                    child_id,
                })
                .collect(),
        }
    }

    #[test]
    fn test_page_kind_conversion() {
        assert_eq!(PageKind::try_from(b'L'), Ok(PageKind::Leaf));
        assert_eq!(PageKind::try_from(b'N'), Ok(PageKind::Internal));
        assert_eq!(PageKind::try_from(b'X'), Err(b'X'));
    }

    #[test]
    fn test_header_size_matches_encoding() {
        let page = Page::new_leaf(1);
        assert_eq!(page.encoded_size(), PAGE_HEADER_SIZE);
        assert_eq!(page.byte_size as usize, PAGE_HEADER_SIZE);

        let up = UpKey {
            left: 2,
            right: 3,
            key: b"m".to_vec(),
        };
        let page = Page::new_internal(1, up, 0);
        assert_eq!(
            page.encoded_size(),
            PAGE_HEADER_SIZE + CHILD_FIELD_SIZE + KEY_LEN_FIELD_SIZE + 1
        );
    }

    #[test]
    fn test_leaf_roundtrip() {
        let page = leaf_with(&["anna", "bob", "carl"]);
        let mut buf = vec![0xAAu8; 256];
        page.encode_into(&mut buf).expect("encode");

        assert_eq!(buf[0], b'L');
        assert!(buf[page.encoded_size()..].iter().all(|&b| b == 0));

        let restored = Page::decode(&buf).expect("decode");
        assert_eq!(restored, page);
        assert_eq!(Page::peek_id(&buf).expect("peek"), 7);
    }

    #[test]
    fn test_internal_roundtrip() {
        let mut page = Page::new_internal(
            4,
            UpKey {
                left: 2,
                right: 3,
                key: b"dan".to_vec(),
            },
            12,
        );
        if let Node::Internal(internal) = &mut page.node {
            assert!(internal.insert_separator(UpKey {
                left: 3,
                right: 5,
                key: b"kim".to_vec(),
            }));
        }
        page.refresh_header();

        let mut buf = vec![0u8; 128];
        page.encode_into(&mut buf).expect("encode");
        assert_eq!(buf[0], b'N');

        let restored = Page::decode(&buf).expect("decode");
        assert_eq!(restored, page);
        assert_eq!(restored.subtree_key_count, 12);
    }

    #[test]
    fn test_last_leaf_decodes_without_next() {
        let mut page = Page::new_leaf(1);
        page.refresh_header();
        let mut buf = vec![0u8; 64];
        page.encode_into(&mut buf).expect("encode");

        let restored = Page::decode(&buf).expect("decode");
        let leaf = restored.as_leaf().expect("expected a leaf");
        assert_eq!(leaf.next_leaf_id, None);
        assert!(restored.as_internal().is_none());
        assert!(restored.keys().is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_tag() {
        let mut buf = vec![0u8; 64];
        buf[0] = b'Q';
        assert_eq!(Page::decode(&buf), Err(PageError::InvalidPageTag(b'Q')));
    }

    #[test]
    fn test_decode_rejects_truncated_entries() {
        let page = leaf_with(&["anna", "bob"]);
        let mut buf = vec![0u8; 128];
        page.encode_into(&mut buf).expect("encode");

        let cut = &buf[..page.encoded_size() - 3];
        assert!(matches!(
            Page::decode(cut),
            Err(PageError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_huge_key_count() {
        let mut page = Page::new_leaf(1);
        page.refresh_header();
        let mut buf = vec![0u8; 64];
        page.encode_into(&mut buf).expect("encode");

        // Leaf key count sits after tag, id, next leaf and byte size.
        buf[21..25].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Page::decode(&buf),
            Err(PageError::Truncated { .. })
        ));

        let mut page = Page::new_internal(
            1,
            UpKey {
                left: 2,
                right: 3,
                key: b"m".to_vec(),
            },
            2,
        );
        page.refresh_header();
        let mut buf = vec![0u8; 64];
        page.encode_into(&mut buf).expect("encode");

        // Internal pages have no next leaf field.
        buf[13..17].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Page::decode(&buf),
            Err(PageError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_size_mismatch() {
        let mut page = leaf_with(&["anna"]);
        page.byte_size += 1;
        let mut buf = vec![0u8; 128];
        page.encode_into(&mut buf).expect("encode");

        assert!(matches!(
            Page::decode(&buf),
            Err(PageError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_encode_rejects_small_slot() {
        let page = leaf_with(&["anna", "bob", "carl"]);
        let mut buf = vec![0u8; PAGE_HEADER_SIZE + 4];
        assert!(matches!(
            page.encode_into(&mut buf),
            Err(PageError::Truncated { .. })
        ));
    }

    #[test]
    fn test_child_index_ties_go_left() {
        let node = internal_with(&["dan", "kim"], &[10, 20, 30]);

        assert_eq!(node.child_for(b"anna"), 10);
        assert_eq!(node.child_for(b"dan"), 10);
        assert_eq!(node.child_for(b"eve"), 20);
        assert_eq!(node.child_for(b"kim"), 20);
        assert_eq!(node.child_for(b"zed"), 30);
        assert_eq!(node.child_count(), 3);
        assert_eq!(node.children().collect::<Vec<_>>(), vec![10, 20, 30]);
    }

    #[test]
    fn test_insert_separator_repoints_following_entry() {
        let mut node = internal_with(&["dan", "kim"], &[10, 20, 30]);

        // Child 20 (keys in (dan, kim]) split at "fay" into 20 and 40.
        assert!(node.insert_separator(UpKey {
            left: 20,
            right: 40,
            key: b"fay".to_vec(),
        }));

        assert_eq!(node.children().collect::<Vec<_>>(), vec![10, 20, 40, 30]);
        assert_eq!(node.entries[1].key, b"fay".to_vec());
    }

    #[test]
    fn test_insert_separator_repoints_rightmost() {
        let mut node = internal_with(&["dan"], &[10, 20]);

        assert!(node.insert_separator(UpKey {
            left: 20,
            right: 50,
            key: b"pat".to_vec(),
        }));

        assert_eq!(node.rightmost_child_id, 50);
        assert_eq!(node.children().collect::<Vec<_>>(), vec![10, 20, 50]);
    }

    #[test]
    fn test_insert_separator_rejects_wrong_child() {
        let mut node = internal_with(&["dan"], &[10, 20]);
        let before = node.clone();

        assert!(!node.insert_separator(UpKey {
            left: 99,
            right: 50,
            key: b"pat".to_vec(),
        }));
        assert_eq!(node, before);
    }

    #[test]
    fn test_leaf_range_counts() {
        let page = leaf_with(&["anna", "bob", "carl", "dan"]);
        let Node::Leaf(leaf) = &page.node else {
            panic!("expected a leaf");
        };

        assert_eq!(leaf.count_at_least(b"b"), 3);
        assert_eq!(leaf.count_at_least(b"bob"), 3);
        assert_eq!(leaf.count_at_most(b"bob"), 2);
        assert_eq!(leaf.count_at_most(b"a"), 0);
        assert_eq!(leaf.count_between(b"bob", b"carl"), 2);
        assert_eq!(leaf.count_between(b"c", b"d"), 1);
        assert_eq!(leaf.find(b"carl"), Ok(2));
        assert_eq!(leaf.find(b"cat"), Err(3));
    }
}
