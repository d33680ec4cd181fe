//! Error types for BrambleDB.

use crate::page::PageId;
use thiserror::Error;

/// Result type alias using BrambleError.
pub type Result<T> = std::result::Result<T, BrambleError>;

/// Errors that can occur in BrambleDB operations.
///
/// Programmer errors (operations on inconsistent state) are not represented
/// here; they abort via panic instead.
#[derive(Debug, Error)]
pub enum BrambleError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Storage errors
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("no page with ID {0} on disk")]
    PageNotFound(PageId),

    #[error("no space left in page file")]
    PageFileFull,

    #[error("disk is at capacity")]
    DiskFull,

    #[error("all page IDs have been allocated")]
    PageIdsExhausted,

    #[error("page file metadata ({size} B) does not fit in a single page ({limit} B)")]
    MetadataOverflow { size: usize, limit: usize },

    // Buffer pool errors
    #[error("unable to reserve a buffer frame")]
    BufferPoolFull,

    #[error("page {0} is pinned and cannot be deleted")]
    PagePinned(PageId),

    #[error("errors while flushing pages to disk: {0:?}")]
    FlushFailed(Vec<BrambleError>),

    // Tree errors
    #[error("key {0} not found")]
    KeyNotFound(u64),

    #[error("key {0} already present, updates are not supported")]
    DuplicateKey(u64),

    // Configuration errors
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
