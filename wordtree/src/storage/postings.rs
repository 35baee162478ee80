//! Postings storage.
//!
//! A posting is the list of text offsets at which a word occurs. The tree
//! stores one `PostingRef` per key; this module owns what the reference
//! points at.
//!
//! # Block Format
//!
//! `FilePostings` appends fixed-size blocks to the postings file. A posting is
//! a chain of blocks, newest first:
//!
//! ```text
//! +-------------+----------------+-----------------------------+-------------+
//! | Count (u32) | Next (u64)     | Text pointers (u64 x cap)   | CRC32 (u32) |
//! +-------------+----------------+-----------------------------+-------------+
//! ```
//!
//! While the head block has room, `update` appends into it in place and the
//! reference stays the same. Once it is full, a new head block is written
//! whose `next` names the old head, and the reference moves to the new block.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Offset of a document in the text store.
pub type TextPtr = u64;

/// Handle to a posting record, owned by a `PostingsStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PostingRef(u64);

impl PostingRef {
    /// Wrap a raw handle value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw handle value, as stored in leaf pages.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PostingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The postings collaborator the tree calls into.
pub trait PostingsStore {
    /// Start a new posting containing `text`.
    fn create(&mut self, text: TextPtr) -> Result<PostingRef, PostingsError>;

    /// Add `text` to an existing posting.
    ///
    /// `posting` is updated in place if the record moves; the caller must
    /// persist the new value when it changes.
    fn update(&mut self, posting: &mut PostingRef, text: TextPtr) -> Result<(), PostingsError>;

    /// Every text offset of a posting, in insertion order.
    fn read(&mut self, posting: PostingRef) -> Result<Vec<TextPtr>, PostingsError>;

    /// Flush pending writes to durable storage.
    fn sync(&self) -> Result<(), PostingsError> {
        Ok(())
    }
}

/// Encoding of "no next block".
const NO_BLOCK: u64 = u64::MAX;

/// A decoded postings block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    next: u64,
    ptrs: Vec<TextPtr>,
}

/// File-backed postings store.
pub struct FilePostings {
    file: File,
    per_block: usize,
    block_count: u64,
}

impl FilePostings {
    /// Create a new postings file at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path, per_block: usize) -> Result<Self, PostingsError> {
        if path.exists() {
            return Err(PostingsError::AlreadyExists(path.to_path_buf()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(PostingsError::Io)?;

        Ok(Self {
            file,
            per_block: per_block.max(1),
            block_count: 0,
        })
    }

    /// Open an existing postings file.
    pub fn open(path: &Path, per_block: usize) -> Result<Self, PostingsError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(PostingsError::Io)?;

        let per_block = per_block.max(1);
        let len = file.metadata().map_err(PostingsError::Io)?.len();
        let block_size = Self::block_len_for(per_block) as u64;
        if len % block_size != 0 {
            return Err(PostingsError::NotBlockAligned { len, block_size });
        }

        Ok(Self {
            file,
            per_block,
            block_count: len / block_size,
        })
    }

    /// Number of blocks written so far.
    #[must_use]
    pub const fn block_count(&self) -> u64 {
        self.block_count
    }

    /// count (4) + next (8) + pointers (8 each) + crc (4).
    const fn block_len_for(per_block: usize) -> usize {
        4 + 8 + 8 * per_block + 4
    }

    const fn block_len(&self) -> usize {
        Self::block_len_for(self.per_block)
    }

    const fn block_offset(&self, index: u64) -> u64 {
        index * self.block_len() as u64
    }

    fn read_block(&mut self, index: u64) -> Result<Block, PostingsError> {
        if index >= self.block_count {
            return Err(PostingsError::InvalidRef(index));
        }

        let mut buf = vec![0u8; self.block_len()];
        self.file
            .seek(SeekFrom::Start(self.block_offset(index)))
            .map_err(PostingsError::Io)?;
        self.file.read_exact(&mut buf).map_err(PostingsError::Io)?;

        let crc_offset = buf.len() - 4;
        let stored = u32::from_le_bytes([
            buf[crc_offset],
            buf[crc_offset + 1],
            buf[crc_offset + 2],
            buf[crc_offset + 3],
        ]);
        let actual = crc32fast::hash(&buf[..crc_offset]);
        if stored != actual {
            return Err(PostingsError::ChecksumMismatch {
                block: index,
                expected: stored,
                actual,
            });
        }

        let count = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if count > self.per_block {
            return Err(PostingsError::InvalidRef(index));
        }
        let next = read_u64(&buf, 4);
        let ptrs = (0..count).map(|i| read_u64(&buf, 12 + 8 * i)).collect();

        Ok(Block { next, ptrs })
    }

    fn write_block(&mut self, index: u64, block: &Block) -> Result<(), PostingsError> {
        let mut buf = vec![0u8; self.block_len()];

        let count = u32::try_from(block.ptrs.len()).unwrap_or(u32::MAX);
        buf[0..4].copy_from_slice(&count.to_le_bytes());
        buf[4..12].copy_from_slice(&block.next.to_le_bytes());
        for (i, ptr) in block.ptrs.iter().enumerate() {
            buf[12 + 8 * i..20 + 8 * i].copy_from_slice(&ptr.to_le_bytes());
        }
        let crc_offset = buf.len() - 4;
        let crc = crc32fast::hash(&buf[..crc_offset]);
        buf[crc_offset..].copy_from_slice(&crc.to_le_bytes());

        self.file
            .seek(SeekFrom::Start(self.block_offset(index)))
            .map_err(PostingsError::Io)?;
        self.file.write_all(&buf).map_err(PostingsError::Io)?;

        if index >= self.block_count {
            self.block_count = index + 1;
        }
        Ok(())
    }

    fn append_block(&mut self, block: &Block) -> Result<u64, PostingsError> {
        let index = self.block_count;
        self.write_block(index, block)?;
        Ok(index)
    }
}

impl PostingsStore for FilePostings {
    fn create(&mut self, text: TextPtr) -> Result<PostingRef, PostingsError> {
        let index = self.append_block(&Block {
            next: NO_BLOCK,
            ptrs: vec![text],
        })?;
        Ok(PostingRef::new(index))
    }

    fn update(&mut self, posting: &mut PostingRef, text: TextPtr) -> Result<(), PostingsError> {
        let mut head = self.read_block(posting.get())?;
        if head.ptrs.len() < self.per_block {
            head.ptrs.push(text);
            return self.write_block(posting.get(), &head);
        }

        let index = self.append_block(&Block {
            next: posting.get(),
            ptrs: vec![text],
        })?;
        *posting = PostingRef::new(index);
        Ok(())
    }

    fn read(&mut self, posting: PostingRef) -> Result<Vec<TextPtr>, PostingsError> {
        let mut blocks = Vec::new();
        let mut index = posting.get();
        while index != NO_BLOCK {
            if blocks.len() as u64 >= self.block_count {
                // A chain longer than the file has a cycle.
                return Err(PostingsError::InvalidRef(posting.get()));
            }
            let block = self.read_block(index)?;
            index = block.next;
            blocks.push(block.ptrs);
        }
        Ok(blocks.into_iter().rev().flatten().collect())
    }

    fn sync(&self) -> Result<(), PostingsError> {
        self.file.sync_all().map_err(PostingsError::Io)
    }
}

impl std::fmt::Debug for FilePostings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePostings")
            .field("per_block", &self.per_block)
            .field("block_count", &self.block_count)
            .finish_non_exhaustive()
    }
}

/// In-memory postings store with the same relocation behavior as `FilePostings`.
#[derive(Debug, Default)]
pub struct MemoryPostings {
    per_block: usize,
    blocks: Vec<Block>,
}

impl MemoryPostings {
    /// Create an empty store whose blocks hold `per_block` pointers.
    #[must_use]
    pub fn new(per_block: usize) -> Self {
        Self {
            per_block: per_block.max(1),
            blocks: Vec::new(),
        }
    }

    /// Number of blocks allocated so far.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn block_mut(&mut self, posting: PostingRef) -> Result<&mut Block, PostingsError> {
        usize::try_from(posting.get())
            .ok()
            .and_then(|i| self.blocks.get_mut(i))
            .ok_or(PostingsError::InvalidRef(posting.get()))
    }

    fn push(&mut self, block: Block) -> PostingRef {
        self.blocks.push(block);
        PostingRef::new(self.blocks.len() as u64 - 1)
    }
}

impl PostingsStore for MemoryPostings {
    fn create(&mut self, text: TextPtr) -> Result<PostingRef, PostingsError> {
        Ok(self.push(Block {
            next: NO_BLOCK,
            ptrs: vec![text],
        }))
    }

    fn update(&mut self, posting: &mut PostingRef, text: TextPtr) -> Result<(), PostingsError> {
        let per_block = self.per_block;
        let head = self.block_mut(*posting)?;
        if head.ptrs.len() < per_block {
            head.ptrs.push(text);
            return Ok(());
        }
        *posting = self.push(Block {
            next: posting.get(),
            ptrs: vec![text],
        });
        Ok(())
    }

    fn read(&mut self, posting: PostingRef) -> Result<Vec<TextPtr>, PostingsError> {
        let mut chain = Vec::new();
        let mut current = posting;
        loop {
            let block = self.block_mut(current)?;
            chain.push(block.ptrs.clone());
            if block.next == NO_BLOCK {
                break;
            }
            current = PostingRef::new(block.next);
        }
        Ok(chain.into_iter().rev().flatten().collect())
    }
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Errors that can occur in the postings store.
#[derive(Debug)]
pub enum PostingsError {
    /// I/O error.
    Io(std::io::Error),
    /// File already exists.
    AlreadyExists(PathBuf),
    /// File length is not a whole number of blocks.
    NotBlockAligned { len: u64, block_size: u64 },
    /// Reference does not name a valid block.
    InvalidRef(u64),
    /// Block contents do not match their checksum.
    ChecksumMismatch { block: u64, expected: u32, actual: u32 },
}

impl std::fmt::Display for PostingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::AlreadyExists(p) => write!(f, "file already exists: {}", p.display()),
            Self::NotBlockAligned { len, block_size } => {
                write!(f, "postings file length {len} is not a multiple of {block_size}")
            }
            Self::InvalidRef(r) => write!(f, "invalid posting reference #{r}"),
            Self::ChecksumMismatch {
                block,
                expected,
                actual,
            } => write!(
                f,
                "postings block {block} checksum mismatch: expected {expected}, got {actual}"
            ),
        }
    }
}

impl std::error::Error for PostingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::AlreadyExists(_)
            | Self::NotBlockAligned { .. }
            | Self::InvalidRef(_)
            | Self::ChecksumMismatch { .. } => None,
        }
    }
}
