//! A single on-disk file holding a bounded number of pages.

use bramble_common::{BrambleError, Page, PageId, Result, PAGE_DATA_SIZE, PAGE_SIZE};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file on disk containing up to `capacity` pages plus one leading
/// metadata page.
///
/// The metadata page records the capacity, the current page count, and the
/// page-ID to byte-offset map, all guarded by a CRC32 checksum. Every page
/// slab is likewise written as a CRC32 of its data area followed by the data
/// area itself.
pub struct PageFile {
    path: PathBuf,
    file: File,
    capacity: u32,
    page_count: u32,
    locations: HashMap<PageId, u32>,
}

impl PageFile {
    /// Opens a page file, creating it if it does not exist yet.
    ///
    /// An existing file has its metadata page read and validated; a fresh one
    /// is initialized with zeroed counts and an empty offset map, which is
    /// immediately persisted. Fails if the encoded metadata for the requested
    /// capacity cannot fit in a single page.
    pub fn open(path: impl Into<PathBuf>, capacity: u32) -> Result<Self> {
        let path = path.into();

        let size = Self::metadata_size(capacity);
        if size > PAGE_SIZE {
            return Err(BrambleError::MetadataOverflow {
                size,
                limit: PAGE_SIZE,
            });
        }

        let existed = path.try_exists()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let mut page_file = Self {
            path,
            file,
            capacity,
            page_count: 0,
            locations: HashMap::new(),
        };

        if existed {
            page_file.load_metadata()?;
        } else {
            tracing::debug!(path = %page_file.path.display(), capacity, "creating page file");
            page_file.store_metadata()?;
        }

        Ok(page_file)
    }

    /// Returns the path this page file lives at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns whether this file is full.
    pub fn is_full(&self) -> bool {
        self.page_count == self.capacity
    }

    /// Returns the number of pages currently stored.
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Returns whether a page with the given ID is stored in this file.
    pub fn contains(&self, id: PageId) -> bool {
        self.locations.contains_key(&id)
    }

    /// Writes the page to the file.
    ///
    /// A page already present is overwritten in place; a new page claims the
    /// lowest unused offset. If the offset map changed, the metadata page is
    /// flushed as well. Fails if the file is full or an I/O error occurs.
    pub fn write_page(&mut self, page: &Page) -> Result<()> {
        let (offset, metadata_dirty) = match self.locations.get(&page.id) {
            Some(&offset) => (offset, false),
            None => (self.find_empty_offset()?, true),
        };

        // A slab is a CRC32 of the data area followed by the data area; the
        // remaining page metadata either lives elsewhere (the ID) or is
        // meaningless on disk (pin count, dirty flag).
        let mut block = vec![0u8; PAGE_SIZE];
        let checksum = crc32fast::hash(&page.data[..]);
        block[0..4].copy_from_slice(&checksum.to_be_bytes());
        block[4..4 + PAGE_DATA_SIZE].copy_from_slice(&page.data[..]);

        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(&block)?;

        if metadata_dirty {
            self.locations.insert(page.id, offset);
            self.page_count += 1;
            self.store_metadata()?;
        }

        Ok(())
    }

    /// Reads the page with the given ID from the file.
    ///
    /// Fails if no such page exists, the checksum does not match, or an I/O
    /// error occurs.
    pub fn read_page(&mut self, id: PageId) -> Result<Page> {
        let offset = *self
            .locations
            .get(&id)
            .ok_or(BrambleError::PageNotFound(id))?;

        let mut block = vec![0u8; PAGE_SIZE];
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.read_exact(&mut block)?;

        let stored = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
        let mut page = Page::new(id);
        page.data.copy_from_slice(&block[4..4 + PAGE_DATA_SIZE]);

        let computed = crc32fast::hash(&page.data[..]);
        if computed != stored {
            return Err(BrambleError::ChecksumMismatch { stored, computed });
        }

        Ok(page)
    }

    /// Deallocates the page with the given ID.
    ///
    /// The page is removed from the offset map and its slab zeroed on disk,
    /// then the metadata page is flushed. Fails if the page is not present.
    pub fn deallocate_page(&mut self, id: PageId) -> Result<()> {
        let offset = *self
            .locations
            .get(&id)
            .ok_or(BrambleError::PageNotFound(id))?;

        let zeroes = vec![0u8; PAGE_SIZE];
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(&zeroes)?;

        self.locations.remove(&id);
        self.page_count -= 1;
        self.store_metadata()
    }

    /// Finds the lowest unused offset in the file.
    ///
    /// The zeroth page-sized slot is reserved for metadata, so offsets run
    /// from `PAGE_SIZE` through `capacity * PAGE_SIZE`.
    fn find_empty_offset(&self) -> Result<u32> {
        if self.is_full() {
            return Err(BrambleError::PageFileFull);
        }

        let occupied: HashSet<u32> = self.locations.values().copied().collect();
        let mut offset = PAGE_SIZE as u32;
        while offset <= self.capacity * PAGE_SIZE as u32 {
            if !occupied.contains(&offset) {
                return Ok(offset);
            }
            offset += PAGE_SIZE as u32;
        }

        unreachable!(
            "page file at {} not full but no free offset found",
            self.path.display()
        );
    }

    fn metadata_size(capacity: u32) -> usize {
        // 4 B capacity + 4 B page count + 8 B per map entry + 4 B CRC32.
        4 + 4 + capacity as usize * 8 + 4
    }

    /// Encodes the metadata page: capacity, page count, the offset map, and
    /// a trailing CRC32 over everything before it.
    fn encode_metadata(&self) -> Vec<u8> {
        assert_eq!(
            self.locations.len(),
            self.page_count as usize,
            "page file metadata drifted: {} map entries but page count {}",
            self.locations.len(),
            self.page_count,
        );

        let mut data = vec![0u8; PAGE_SIZE];
        data[0..4].copy_from_slice(&self.capacity.to_be_bytes());
        data[4..8].copy_from_slice(&self.page_count.to_be_bytes());

        for (i, (id, offset)) in self.locations.iter().enumerate() {
            let key_start = 8 + i * 8;
            data[key_start..key_start + 4].copy_from_slice(&id.to_be_bytes());
            data[key_start + 4..key_start + 8].copy_from_slice(&offset.to_be_bytes());
        }

        let checksum = crc32fast::hash(&data[..PAGE_SIZE - 4]);
        data[PAGE_SIZE - 4..].copy_from_slice(&checksum.to_be_bytes());

        data
    }

    /// Decodes a metadata page and installs it.
    ///
    /// On any validation failure the current metadata is left untouched.
    fn decode_metadata(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < PAGE_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("metadata page truncated to {} B", data.len()),
            )
            .into());
        }

        let stored = u32::from_be_bytes([
            data[PAGE_SIZE - 4],
            data[PAGE_SIZE - 3],
            data[PAGE_SIZE - 2],
            data[PAGE_SIZE - 1],
        ]);
        let computed = crc32fast::hash(&data[..PAGE_SIZE - 4]);
        if computed != stored {
            return Err(BrambleError::ChecksumMismatch { stored, computed });
        }

        let capacity = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let page_count = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);

        let mut locations = HashMap::with_capacity(page_count as usize);
        for i in 0..page_count as usize {
            let key_start = 8 + i * 8;
            let id = PageId::from_be_bytes([
                data[key_start],
                data[key_start + 1],
                data[key_start + 2],
                data[key_start + 3],
            ]);
            let offset = u32::from_be_bytes([
                data[key_start + 4],
                data[key_start + 5],
                data[key_start + 6],
                data[key_start + 7],
            ]);
            locations.insert(id, offset);
        }

        self.capacity = capacity;
        self.page_count = page_count;
        self.locations = locations;

        Ok(())
    }

    fn load_metadata(&mut self) -> Result<()> {
        let mut data = vec![0u8; PAGE_SIZE];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut data)?;

        self.decode_metadata(&data)
    }

    fn store_metadata(&mut self) -> Result<()> {
        let data = self.encode_metadata();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&data)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn page_with_marker(id: u32, marker: u8) -> Page {
        let mut page = Page::new(PageId(id));
        page.data[0] = marker;
        page.data[PAGE_DATA_SIZE - 1] = marker;
        page
    }

    #[test]
    fn test_open_creates_file_with_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.0");

        let pf = PageFile::open(&path, 8).unwrap();
        assert_eq!(pf.page_count(), 0);
        assert!(!pf.is_full());
        assert!(path.exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), PAGE_SIZE as u64);
    }

    #[test]
    fn test_open_rejects_oversized_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.0");

        // (PAGE_SIZE - 12) / 8 is the largest capacity whose metadata fits.
        let too_many = ((PAGE_SIZE - 12) / 8 + 1) as u32;
        let result = PageFile::open(&path, too_many);
        assert!(matches!(result, Err(BrambleError::MetadataOverflow { .. })));
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let mut pf = PageFile::open(dir.path().join("pages.0"), 8).unwrap();

        let page = page_with_marker(3, 0xAB);
        pf.write_page(&page).unwrap();

        let read = pf.read_page(PageId(3)).unwrap();
        assert_eq!(read.id, PageId(3));
        assert_eq!(read.data[0], 0xAB);
        assert_eq!(read.data[PAGE_DATA_SIZE - 1], 0xAB);
    }

    #[test]
    fn test_read_missing_page() {
        let dir = tempdir().unwrap();
        let mut pf = PageFile::open(dir.path().join("pages.0"), 8).unwrap();

        let result = pf.read_page(PageId(9));
        assert!(matches!(result, Err(BrambleError::PageNotFound(PageId(9)))));
    }

    #[test]
    fn test_overwrite_keeps_count() {
        let dir = tempdir().unwrap();
        let mut pf = PageFile::open(dir.path().join("pages.0"), 8).unwrap();

        pf.write_page(&page_with_marker(1, 0x01)).unwrap();
        pf.write_page(&page_with_marker(1, 0x02)).unwrap();

        assert_eq!(pf.page_count(), 1);
        assert_eq!(pf.read_page(PageId(1)).unwrap().data[0], 0x02);
    }

    #[test]
    fn test_full_file_rejects_new_page() {
        let dir = tempdir().unwrap();
        let mut pf = PageFile::open(dir.path().join("pages.0"), 2).unwrap();

        pf.write_page(&page_with_marker(0, 0)).unwrap();
        pf.write_page(&page_with_marker(1, 1)).unwrap();

        let result = pf.write_page(&page_with_marker(2, 2));
        assert!(matches!(result, Err(BrambleError::PageFileFull)));

        // Overwriting a resident page still works.
        pf.write_page(&page_with_marker(1, 9)).unwrap();
    }

    #[test]
    fn test_deallocate_then_reuse_lowest_offset() {
        let dir = tempdir().unwrap();
        let mut pf = PageFile::open(dir.path().join("pages.0"), 4).unwrap();

        pf.write_page(&page_with_marker(10, 1)).unwrap();
        pf.write_page(&page_with_marker(11, 2)).unwrap();
        pf.write_page(&page_with_marker(12, 3)).unwrap();

        pf.deallocate_page(PageId(11)).unwrap();
        assert_eq!(pf.page_count(), 2);
        assert!(matches!(
            pf.read_page(PageId(11)),
            Err(BrambleError::PageNotFound(_))
        ));

        // The freed offset (the second slab) is the lowest unused one.
        pf.write_page(&page_with_marker(20, 4)).unwrap();
        assert_eq!(pf.locations[&PageId(20)], 2 * PAGE_SIZE as u32);
    }

    #[test]
    fn test_deallocate_missing_page() {
        let dir = tempdir().unwrap();
        let mut pf = PageFile::open(dir.path().join("pages.0"), 4).unwrap();

        assert!(matches!(
            pf.deallocate_page(PageId(1)),
            Err(BrambleError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_metadata_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.0");

        {
            let mut pf = PageFile::open(&path, 8).unwrap();
            pf.write_page(&page_with_marker(5, 0x55)).unwrap();
            pf.write_page(&page_with_marker(6, 0x66)).unwrap();
        }

        let mut pf = PageFile::open(&path, 8).unwrap();
        assert_eq!(pf.page_count(), 2);
        assert_eq!(pf.read_page(PageId(5)).unwrap().data[0], 0x55);
        assert_eq!(pf.read_page(PageId(6)).unwrap().data[0], 0x66);
    }

    #[test]
    fn test_corrupted_page_fails_checksum() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.0");

        let mut pf = PageFile::open(&path, 8).unwrap();
        pf.write_page(&page_with_marker(1, 0xAA)).unwrap();
        drop(pf);

        // Flip a byte in the middle of the first page slab.
        let mut raw = std::fs::read(&path).unwrap();
        raw[PAGE_SIZE + 100] ^= 0xFF;
        std::fs::write(&path, &raw).unwrap();

        let mut pf = PageFile::open(&path, 8).unwrap();
        let result = pf.read_page(PageId(1));
        assert!(matches!(result, Err(BrambleError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_corrupted_metadata_rejected_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.0");

        let mut pf = PageFile::open(&path, 8).unwrap();
        pf.write_page(&page_with_marker(1, 0xAA)).unwrap();
        drop(pf);

        let mut raw = std::fs::read(&path).unwrap();
        raw[6] ^= 0xFF;
        std::fs::write(&path, &raw).unwrap();

        let result = PageFile::open(&path, 8);
        assert!(matches!(result, Err(BrambleError::ChecksumMismatch { .. })));
    }
}
