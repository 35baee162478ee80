//! Tree configuration module.
//!
//! This module provides configuration loading for the word index from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `WORDTREE_DATA_DIRECTORY`: Directory holding the tree and postings files (default: `./data`)
//! - `WORDTREE_PAGE_SIZE`: Page capacity in bytes (default: `1024`)
//! - `WORDTREE_POSTINGS_PER_BLOCK`: Text pointers per postings block (default: `8`)
//!
//! # Invariants
//!
//! - `page_size` is always within `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]`
//! - `postings_per_block` is never zero

use std::path::PathBuf;

use crate::storage::{KEY_LEN_FIELD_SIZE, PAGE_HEADER_SIZE, POSTING_FIELD_SIZE};

/// Hard cap on the length of any key, regardless of page size.
pub const MAX_WORD_SIZE: usize = 100;

/// Smallest page size that still leaves room for a useful key.
pub const MIN_PAGE_SIZE: usize = 64;

/// Largest page size; `byte_size` is stored as a u32 but pages stay small.
pub const MAX_PAGE_SIZE: usize = 65536;

/// Name of the page file inside the data directory.
pub const TREE_FILE_NAME: &str = "B-TREE_FILE";

/// Name of the postings file inside the data directory.
pub const POSTINGS_FILE_NAME: &str = "POSTINGSFILE";

/// Word index configuration.
///
/// # Post-conditions
///
/// When constructed via `from_env()` or `new()`, `validate()` has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Directory holding `B-TREE_FILE` and `POSTINGSFILE`.
    pub data_directory: PathBuf,
    /// Capacity of one page in bytes. Fixed for the lifetime of a tree file.
    pub page_size: usize,
    /// Number of text pointers a postings block holds before a new block is chained.
    pub postings_per_block: usize,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from(Self::DEFAULT_DATA_DIRECTORY),
            page_size: Self::DEFAULT_PAGE_SIZE,
            postings_per_block: Self::DEFAULT_POSTINGS_PER_BLOCK,
        }
    }
}

impl TreeConfig {
    /// Default page size in bytes.
    pub const DEFAULT_PAGE_SIZE: usize = 1024;
    /// Default number of text pointers per postings block.
    pub const DEFAULT_POSTINGS_PER_BLOCK: usize = 8;
    /// Default data directory.
    pub const DEFAULT_DATA_DIRECTORY: &'static str = "./data";

    /// Build a configuration with the given page size and default everything else.
    ///
    /// # Errors
    ///
    /// Returns an error if the page size is outside the supported range.
    pub fn new(page_size: usize) -> Result<Self, ConfigError> {
        let config = Self {
            page_size,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the data directory.
    #[must_use]
    pub fn with_data_directory(mut self, data_directory: PathBuf) -> Self {
        self.data_directory = data_directory;
        self
    }

    /// Replace the postings block capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if `postings_per_block` is zero.
    pub fn with_postings_per_block(mut self, postings_per_block: usize) -> Result<Self, ConfigError> {
        self.postings_per_block = postings_per_block;
        self.validate()?;
        Ok(self)
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `WORDTREE_PAGE_SIZE` is set but not a number in the supported range
    /// - `WORDTREE_POSTINGS_PER_BLOCK` is set but not a positive number
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            data_directory: Self::load_data_directory(),
            page_size: Self::load_usize("WORDTREE_PAGE_SIZE", Self::DEFAULT_PAGE_SIZE)?,
            postings_per_block: Self::load_usize(
                "WORDTREE_POSTINGS_PER_BLOCK",
                Self::DEFAULT_POSTINGS_PER_BLOCK,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every field against its supported range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ConfigError::InvalidValue {
                name: "WORDTREE_PAGE_SIZE".to_string(),
                message: format!(
                    "{} is outside the supported range {MIN_PAGE_SIZE}-{MAX_PAGE_SIZE}",
                    self.page_size
                ),
            });
        }
        if self.postings_per_block == 0 {
            return Err(ConfigError::InvalidValue {
                name: "WORDTREE_POSTINGS_PER_BLOCK".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Longest key accepted by `insert`.
    ///
    /// A key plus its minimal entry overhead must fit in an empty page.
    #[must_use]
    pub const fn max_key_size(&self) -> usize {
        let fits_in_page = self
            .page_size
            .saturating_sub(PAGE_HEADER_SIZE + POSTING_FIELD_SIZE + KEY_LEN_FIELD_SIZE);
        if fits_in_page < MAX_WORD_SIZE {
            fits_in_page
        } else {
            MAX_WORD_SIZE
        }
    }

    /// Path of the page file.
    #[must_use]
    pub fn tree_path(&self) -> PathBuf {
        self.data_directory.join(TREE_FILE_NAME)
    }

    /// Path of the postings file.
    #[must_use]
    pub fn postings_path(&self) -> PathBuf {
        self.data_directory.join(POSTINGS_FILE_NAME)
    }

    /// Load the data directory from environment.
    ///
    /// Returns the default if not set.
    fn load_data_directory() -> PathBuf {
        std::env::var("WORDTREE_DATA_DIRECTORY")
            .map_or_else(|_| PathBuf::from(Self::DEFAULT_DATA_DIRECTORY), PathBuf::from)
    }

    /// Load a numeric setting from environment.
    ///
    /// Returns `default` if not set.
    fn load_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
        match std::env::var(name) {
            Ok(value) => value.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("'{value}' is not a valid number"),
            }),
            Err(_) => Ok(default),
        }
    }
}
