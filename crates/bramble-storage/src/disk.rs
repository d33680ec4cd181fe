//! Page-granular disk abstraction and its persistent implementation.

use crate::page_file::PageFile;
use bramble_common::{BrambleError, Page, PageId, Result, PAGE_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

/// Name of the file holding the disk's allocator metadata.
pub const DISK_META_FILE: &str = "disk.meta";

/// Prefix of the sharded page files; the shard index is appended after a dot.
pub const PAGE_FILE_PREFIX: &str = "disk.pages";

/// Number of pages stored in a single page file.
///
/// The upper limit of `(PAGE_SIZE - 12) / 8` follows from the requirement
/// that a page file's metadata (mostly the ID to offset table) fits in its
/// first page.
pub const PAGES_PER_FILE: u32 = ((PAGE_SIZE - 12) / 8) as u32;

/// Page-granular storage.
///
/// A disk hands out fresh pages, persists and returns them by ID, and takes
/// pages back for recycling. [`close`](Disk::close) must be called once all
/// page operations are done so allocator state reaches stable storage.
pub trait Disk: Send + Sync {
    /// Allocates a new page with the lowest unused ID and a zeroed data
    /// area. The fresh page is always written to disk immediately, as it may
    /// target a shard file or offset that does not exist yet.
    fn allocate_page(&self) -> Result<Page>;

    /// Deallocates a page, zeroing it on disk and recycling its ID.
    ///
    /// Deallocating an unallocated or out-of-range ID is a no-op.
    fn deallocate_page(&self, id: PageId);

    /// Reads the page with the given ID. Fails if it was never allocated.
    fn read_page(&self, id: PageId) -> Result<Page>;

    /// Writes a previously allocated page.
    fn write_page(&self, page: &Page) -> Result<()>;

    /// Returns the number of currently allocated pages.
    fn occupied(&self) -> u64;

    /// Returns the maximum number of supported pages.
    fn capacity(&self) -> u64;

    /// Flushes allocator metadata. The disk may not be used afterwards.
    fn close(&self) -> Result<()>;
}

/// Allocator state shared behind a lock: the next unused page ID and the
/// queue of deallocated IDs awaiting recycling.
struct AllocatorState {
    next_page_id: u32,
    free: VecDeque<PageId>,
}

/// A [`Disk`] persisting pages across sharded page files in a directory.
///
/// Page IDs map to shard files by integer division: with 510 pages per file,
/// IDs 0 through 509 live in shard 0, 510 through 1019 in shard 1, and so
/// on. Shard files
/// are created lazily and kept open once touched.
pub struct PersistentDisk {
    directory: PathBuf,
    state: Mutex<AllocatorState>,
    files: Mutex<HashMap<u32, PageFile>>,
}

impl PersistentDisk {
    /// Opens the disk rooted at `directory`, creating the directory if
    /// needed.
    ///
    /// If the directory already holds a store, governed by the existence of
    /// the metadata file, allocator state is loaded and validated from it.
    /// Otherwise fresh metadata is written out.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;

        let disk = Self {
            directory,
            state: Mutex::new(AllocatorState {
                next_page_id: 0,
                free: VecDeque::new(),
            }),
            files: Mutex::new(HashMap::new()),
        };

        if disk.meta_file_path().try_exists()? {
            disk.load_metadata()?;
            tracing::debug!(directory = %disk.directory.display(), "opened existing disk");
        } else {
            disk.store_metadata()?;
            tracing::debug!(directory = %disk.directory.display(), "initialized new disk");
        }

        Ok(disk)
    }

    /// Returns the directory this disk persists to.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn meta_file_path(&self) -> PathBuf {
        self.directory.join(DISK_META_FILE)
    }

    fn shard_file_path(&self, shard: u32) -> PathBuf {
        self.directory.join(format!("{PAGE_FILE_PREFIX}.{shard}"))
    }

    /// Runs `op` against the page file owning `id`, opening the shard on
    /// first touch.
    fn with_page_file<R>(&self, id: PageId, op: impl FnOnce(&mut PageFile) -> Result<R>) -> Result<R> {
        let shard = id.0 / PAGES_PER_FILE;
        let mut files = self.files.lock();

        let page_file = match files.entry(shard) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let opened = PageFile::open(self.shard_file_path(shard), PAGES_PER_FILE)?;
                entry.insert(opened)
            }
        };

        op(page_file)
    }

    /// Encodes allocator metadata: next page ID, free-list length, free-list
    /// entries, and a trailing CRC32, all big-endian.
    fn encode_metadata(&self) -> Vec<u8> {
        let state = self.state.lock();

        let mut buf = BytesMut::with_capacity(4 + 8 + state.free.len() * 4 + 4);
        buf.put_u32(state.next_page_id);
        buf.put_u64(state.free.len() as u64);
        for id in &state.free {
            buf.put_u32(id.0);
        }

        let checksum = crc32fast::hash(&buf);
        buf.put_u32(checksum);

        buf.to_vec()
    }

    /// Decodes allocator metadata, leaving state untouched on any failure.
    fn decode_metadata(&self, data: &[u8]) -> Result<()> {
        if data.len() < 16 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("disk metadata truncated to {} B", data.len()),
            )
            .into());
        }

        let (payload, tail) = data.split_at(data.len() - 4);
        let stored = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);
        let computed = crc32fast::hash(payload);
        if computed != stored {
            return Err(BrambleError::ChecksumMismatch { stored, computed });
        }

        let mut payload = payload;
        let next_page_id = payload.get_u32();
        let free_len = payload.get_u64() as usize;
        if payload.remaining() < free_len * 4 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("disk metadata claims {free_len} free entries beyond its length"),
            )
            .into());
        }

        let mut free = VecDeque::with_capacity(free_len);
        for _ in 0..free_len {
            free.push_back(PageId(payload.get_u32()));
        }

        let mut state = self.state.lock();
        state.next_page_id = next_page_id;
        state.free = free;

        Ok(())
    }

    fn load_metadata(&self) -> Result<()> {
        let data = std::fs::read(self.meta_file_path())?;
        self.decode_metadata(&data)
    }

    fn store_metadata(&self) -> Result<()> {
        std::fs::write(self.meta_file_path(), self.encode_metadata())?;
        Ok(())
    }
}

impl Disk for PersistentDisk {
    fn allocate_page(&self) -> Result<Page> {
        let id = {
            let mut state = self.state.lock();
            match state.free.pop_front() {
                Some(id) => id,
                None => {
                    let id = PageId(state.next_page_id);
                    state.next_page_id = state
                        .next_page_id
                        .checked_add(1)
                        .ok_or(BrambleError::PageIdsExhausted)?;
                    id
                }
            }
        };

        let page = Page::new(id);
        self.write_page(&page)?;

        Ok(page)
    }

    fn deallocate_page(&self, id: PageId) {
        let result = self.with_page_file(id, |pf| pf.deallocate_page(id));
        match result {
            Ok(()) => self.state.lock().free.push_back(id),
            Err(err) => {
                // The page was never allocated, or the shard is unreadable.
                // Either way the ID must not be recycled.
                tracing::trace!(%id, %err, "ignoring deallocation of unallocated page");
            }
        }
    }

    fn read_page(&self, id: PageId) -> Result<Page> {
        self.with_page_file(id, |pf| pf.read_page(id))
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        self.with_page_file(page.id, |pf| pf.write_page(page))
    }

    fn occupied(&self) -> u64 {
        let state = self.state.lock();
        state.next_page_id as u64 - state.free.len() as u64
    }

    fn capacity(&self) -> u64 {
        // Page IDs are u32; no lower limit is enforced.
        1 << 32
    }

    fn close(&self) -> Result<()> {
        self.store_metadata()
    }
}
