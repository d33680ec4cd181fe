//! Buffer frame management.

use bramble_common::{PageId, PAGE_DATA_SIZE};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};

/// Sentinel value indicating no page is loaded in the frame.
const NO_PAGE: u64 = u64::MAX;

/// Unique identifier for a frame in the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// A frame in the buffer pool holding at most one resident page.
///
/// Each frame carries the page's data area plus the metadata the pool needs
/// for cache management: the resident page's ID, a pin count, and a dirty
/// flag. A page whose pin count is positive may be neither evicted nor
/// deleted.
pub struct BufferFrame {
    /// The page currently stored in this frame, widened to a u64 so that
    /// `NO_PAGE` can sit outside the 32-bit ID space.
    page_id: AtomicU64,
    /// Number of outstanding borrows of this page.
    pin_count: AtomicU16,
    /// Whether the page was modified after being read.
    is_dirty: AtomicBool,
    /// Page data buffer.
    data: RwLock<Box<[u8; PAGE_DATA_SIZE]>>,
}

impl BufferFrame {
    /// Creates a new empty buffer frame.
    pub fn new() -> Self {
        Self {
            page_id: AtomicU64::new(NO_PAGE),
            pin_count: AtomicU16::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_DATA_SIZE])),
        }
    }

    /// Returns the ID of the resident page, if any.
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        match self.page_id.load(Ordering::Acquire) {
            NO_PAGE => None,
            packed => Some(PageId(packed as u32)),
        }
    }

    /// Sets the resident page ID.
    #[inline]
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        let packed = match page_id {
            Some(id) => id.0 as u64,
            None => NO_PAGE,
        };
        self.page_id.store(packed, Ordering::Release);
    }

    /// Returns the current pin count.
    #[inline]
    pub fn pin_count(&self) -> u16 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count.
    #[inline]
    pub fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the pin count unless it is already 0.
    ///
    /// Returns the new pin count.
    #[inline]
    pub fn unpin(&self) -> u16 {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            // Underflow protection: restore to 0.
            self.pin_count.store(0, Ordering::Release);
            return 0;
        }
        prev - 1
    }

    /// Returns true if this frame is pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Returns true if the resident page was modified.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// Sets or clears the dirty flag.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Returns true if no page is resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.page_id.load(Ordering::Acquire) == NO_PAGE
    }

    /// Reads the page data.
    #[inline]
    pub fn read_data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_DATA_SIZE]>> {
        self.data.read()
    }

    /// Writes to the page data.
    #[inline]
    pub fn write_data(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_DATA_SIZE]>> {
        self.data.write()
    }

    /// Copies data into the frame.
    #[inline]
    pub fn copy_from(&self, src: &[u8]) {
        let mut data = self.data.write();
        let len = src.len().min(PAGE_DATA_SIZE);
        data[..len].copy_from_slice(&src[..len]);
    }

    /// Resets the frame to its empty state.
    pub fn reset(&self) {
        self.page_id.store(NO_PAGE, Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}

impl Default for BufferFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BufferFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferFrame")
            .field("page_id", &self.page_id())
            .field("pin_count", &self.pin_count())
            .field("is_dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_id_display() {
        assert_eq!(FrameId(42).to_string(), "frame:42");
    }

    #[test]
    fn test_new_frame_is_empty() {
        let frame = BufferFrame::new();

        assert!(frame.page_id().is_none());
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        assert!(frame.is_empty());
    }

    #[test]
    fn test_pin_unpin() {
        let frame = BufferFrame::new();

        assert!(!frame.is_pinned());

        frame.pin();
        assert!(frame.is_pinned());
        assert_eq!(frame.pin_count(), 1);

        frame.pin();
        assert_eq!(frame.pin_count(), 2);

        assert_eq!(frame.unpin(), 1);
        assert!(frame.is_pinned());

        assert_eq!(frame.unpin(), 0);
        assert!(!frame.is_pinned());
    }

    #[test]
    fn test_unpin_saturates_at_zero() {
        let frame = BufferFrame::new();

        assert_eq!(frame.unpin(), 0);
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_dirty_flag() {
        let frame = BufferFrame::new();

        frame.set_dirty(true);
        assert!(frame.is_dirty());

        frame.set_dirty(false);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_page_id_roundtrip_with_max_id() {
        let frame = BufferFrame::new();

        // The full 32-bit ID space is representable; only the sentinel above
        // it means empty.
        frame.set_page_id(Some(PageId(u32::MAX)));
        assert_eq!(frame.page_id(), Some(PageId(u32::MAX)));
        assert!(!frame.is_empty());

        frame.set_page_id(None);
        assert!(frame.page_id().is_none());
        assert!(frame.is_empty());
    }

    #[test]
    fn test_data_access() {
        let frame = BufferFrame::new();

        {
            let mut data = frame.write_data();
            data[0] = 0xAB;
            data[PAGE_DATA_SIZE - 1] = 0xCD;
        }

        let data = frame.read_data();
        assert_eq!(data[0], 0xAB);
        assert_eq!(data[PAGE_DATA_SIZE - 1], 0xCD);
    }

    #[test]
    fn test_copy_from() {
        let frame = BufferFrame::new();
        frame.copy_from(&[1, 2, 3]);

        let data = frame.read_data();
        assert_eq!(&data[..3], &[1, 2, 3]);
        assert_eq!(data[3], 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let frame = BufferFrame::new();

        frame.set_page_id(Some(PageId(1)));
        frame.pin();
        frame.set_dirty(true);
        frame.write_data()[0] = 0xFF;

        frame.reset();

        assert!(frame.page_id().is_none());
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        assert_eq!(frame.read_data()[0], 0);
    }
}
