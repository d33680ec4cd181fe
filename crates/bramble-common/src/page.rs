//! Page structures for BrambleDB storage.

use serde::{Deserialize, Serialize};

/// Default page size in bytes (4 KiB).
pub const PAGE_SIZE: usize = 4096;

/// Size of the in-memory page metadata. Equivalent to the starting offset of
/// the page's data area within a full page-sized block.
pub const PAGE_METADATA_SIZE: usize = 8;

/// Size of the data area carried by every page.
pub const PAGE_DATA_SIZE: usize = PAGE_SIZE - PAGE_METADATA_SIZE;

/// Size of a stored value in bytes.
pub const VALUE_SIZE: usize = 10;

/// An opaque fixed-size value as stored in the tree's leaves.
pub type Value = [u8; VALUE_SIZE];

/// Unique identifier for a page within a store.
///
/// IDs are allocated monotonically from 0; deallocated IDs are recycled
/// before new ones are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Returns the big-endian on-disk encoding of this ID.
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Decodes an ID from its big-endian on-disk encoding.
    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A page as exchanged with a disk: an identifier plus its data area.
///
/// Pin counts and dirty flags are buffer-pool state and live on the pool's
/// frames, not here.
pub struct Page {
    /// Identifier of the page.
    pub id: PageId,
    /// The raw node data carried by this page.
    pub data: Box<[u8; PAGE_DATA_SIZE]>,
}

impl Page {
    /// Creates a page with a zeroed data area.
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            data: Box::new([0u8; PAGE_DATA_SIZE]),
        }
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page").field("id", &self.id).finish()
    }
}
