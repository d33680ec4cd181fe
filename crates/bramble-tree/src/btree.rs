//! The B+ tree: traversal, insertion, splitting, and store lifecycle.

use crate::node::{InternalPage, LeafPage, NodePage};
use bramble_buffer::{BufferFrame, BufferPool, LruReplacer};
use bramble_common::{BrambleError, PageId, Result, StoreConfig, Value};
use bramble_storage::PersistentDisk;
use std::path::{Path, PathBuf};

/// Name of the file holding the tree's root page ID.
pub const TREE_META_FILE: &str = "tree.meta";

/// A durable B+ tree mapping 8-byte keys to 10-byte values.
///
/// The root page is fetched once when the tree is created or opened and
/// stays pinned for the tree's whole lifetime; [`close`](BTree::close)
/// releases that pin exactly once. `close` and [`delete`](BTree::delete)
/// consume the handle, so no operation can observe a closed tree.
pub struct BTree {
    pool: BufferPool,
    root_id: PageId,
    directory: PathBuf,
}

/// Holds a traversal pin on a page, releasing it when dropped.
///
/// Dirtiness is tracked on the frame itself by the node views, so the drop
/// always unpins clean; an unpin never clears a dirty flag already set.
struct PageGuard<'a> {
    pool: &'a BufferPool,
    frame: &'a BufferFrame,
    id: PageId,
}

impl<'a> PageGuard<'a> {
    /// Fetches and pins the given page.
    fn fetch(pool: &'a BufferPool, id: PageId) -> Result<Self> {
        let frame = pool.fetch_page(id)?;
        Ok(Self { pool, frame, id })
    }

    /// Adopts the pin already held on a freshly allocated page.
    fn adopt(pool: &'a BufferPool, frame: &'a BufferFrame) -> Self {
        let id = frame
            .page_id()
            .expect("freshly allocated frame must hold a page");
        Self { pool, frame, id }
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.id, false);
    }
}

/// One internal node visited on the way from the root to a leaf.
///
/// The root carries no guard: the tree keeps it pinned for its lifetime, so
/// traversals neither pin nor unpin it.
struct TraceNode<'a> {
    frame: &'a BufferFrame,
    _guard: Option<PageGuard<'a>>,
}

impl BTree {
    /// Creates a new store in the configured directory.
    ///
    /// The tree is bootstrapped as an internal root with a fixed mid-range
    /// separator over two empty leaves, so both subtrees are routable from
    /// the start. The root stays pinned.
    pub fn create(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let disk = PersistentDisk::new(&config.working_directory)?;
        let pool = BufferPool::new(
            config.frame_count(),
            Box::new(disk),
            Box::new(LruReplacer::new()),
        );

        let mut tree = Self {
            pool,
            root_id: PageId(0),
            directory: config.working_directory.clone(),
        };
        tree.bootstrap()?;

        tracing::debug!(directory = %tree.directory.display(), root = %tree.root_id, "created store");

        Ok(tree)
    }

    /// Opens an existing store from the configured directory.
    ///
    /// Reads the root page ID from the tree metadata file and pins the root.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let disk = PersistentDisk::new(&config.working_directory)?;
        let pool = BufferPool::new(
            config.frame_count(),
            Box::new(disk),
            Box::new(LruReplacer::new()),
        );

        let root_id = Self::load_metadata(&config.working_directory)?;
        pool.fetch_page(root_id)?;

        tracing::debug!(directory = %config.working_directory.display(), root = %root_id, "opened store");

        Ok(Self {
            pool,
            root_id,
            directory: config.working_directory.clone(),
        })
    }

    /// Looks up the value stored under a key.
    pub fn get(&self, key: u64) -> Result<Value> {
        let (_trace, leaf_guard) = Self::trace_to(&self.pool, self.root_id, key)?;
        let leaf = LeafPage::attach(leaf_guard.frame);

        leaf.get(key).ok_or(BrambleError::KeyNotFound(key))
    }

    /// Stores a value under a key.
    ///
    /// Fails with [`BrambleError::DuplicateKey`] if the key is already
    /// present; the store does not support upserts.
    pub fn put(&mut self, key: u64, value: Value) -> Result<()> {
        let pool = &self.pool;
        let root_id = &mut self.root_id;

        let (trace, leaf_guard) = Self::trace_to(pool, *root_id, key)?;
        let leaf = LeafPage::attach(leaf_guard.frame);

        if leaf.is_full() {
            Self::split_leaf(pool, root_id, trace, leaf_guard, key, value)
        } else if leaf.insert(key, value) {
            Self::release(trace);
            Ok(())
        } else {
            Err(BrambleError::DuplicateKey(key))
        }
    }

    /// Flushes everything and persists the root page ID.
    pub fn close(self) -> Result<()> {
        // The root's standing pin is released exactly once, here.
        self.pool.unpin_page(self.root_id, false);
        self.pool.close()?;
        self.store_metadata()?;

        tracing::debug!(directory = %self.directory.display(), "closed store");

        Ok(())
    }

    /// Removes the store's working directory from the filesystem.
    pub fn delete(self) -> Result<()> {
        std::fs::remove_dir_all(&self.directory)?;

        tracing::debug!(directory = %self.directory.display(), "deleted store");

        Ok(())
    }

    /// Allocates and wires up the initial root and its two leaves.
    fn bootstrap(&mut self) -> Result<()> {
        let root_id = frame_id(self.pool.new_page()?);

        let left_id = {
            let frame = self.pool.new_page()?;
            let _ = LeafPage::attach(frame);
            frame_id(frame)
        };
        let right_id = {
            let frame = self.pool.new_page()?;
            let _ = LeafPage::attach(frame);
            frame_id(frame)
        };

        // Any fixed separator gives two routable leaves; mid-range keeps
        // ascending key streams from landing all on one side.
        let root_frame = self
            .pool
            .resident_page(root_id)
            .expect("root page pinned during bootstrap");
        InternalPage::attach(root_frame).seed(u64::MAX / 2, left_id, right_id);

        self.pool.unpin_page(left_id, true);
        self.pool.unpin_page(right_id, true);

        self.root_id = root_id;

        Ok(())
    }

    /// Descends from the root to the leaf spanning `key`.
    ///
    /// Returns the internal nodes visited, root first, plus a pin guard on
    /// the destination leaf. Every non-root page visited is pinned through a
    /// guard, so an error on any path releases all pins taken so far.
    fn trace_to<'a>(
        pool: &'a BufferPool,
        root_id: PageId,
        key: u64,
    ) -> Result<(Vec<TraceNode<'a>>, PageGuard<'a>)> {
        let root_frame = pool
            .resident_page(root_id)
            .expect("root page must stay resident while the tree is open");

        let mut trace = vec![TraceNode {
            frame: root_frame,
            _guard: None,
        }];

        loop {
            let last = trace.last().expect("trace starts with the root");
            let child = InternalPage::attach(last.frame).route(key);

            let guard = PageGuard::fetch(pool, child)?;
            match NodePage::attach(guard.frame) {
                NodePage::Leaf(_) => return Ok((trace, guard)),
                NodePage::Internal(_) => trace.push(TraceNode {
                    frame: guard.frame,
                    _guard: Some(guard),
                }),
            }
        }
    }

    /// Splits a full leaf and routes the new entry into the proper half,
    /// then propagates the separator upward.
    fn split_leaf(
        pool: &BufferPool,
        root_id: &mut PageId,
        trace: Vec<TraceNode<'_>>,
        leaf_guard: PageGuard<'_>,
        key: u64,
        value: Value,
    ) -> Result<()> {
        let right_guard = PageGuard::adopt(pool, pool.new_page()?);

        let left = LeafPage::attach(leaf_guard.frame);
        let (separator, right) = left.split_right(right_guard.frame);

        let inserted = if key <= separator {
            left.insert(key, value)
        } else {
            right.insert(key, value)
        };

        let right_id = right_guard.id;
        drop(right_guard);
        drop(leaf_guard);

        Self::insert_to_parent(pool, root_id, trace, separator, right_id)?;

        if inserted {
            Ok(())
        } else {
            // The leaf was full of other keys *and* already carried this
            // one; the split stands, the insert is refused.
            Err(BrambleError::DuplicateKey(key))
        }
    }

    /// Inserts a separator and its right child into the deepest node of the
    /// trace, splitting upward as long as parents are full.
    fn insert_to_parent(
        pool: &BufferPool,
        root_id: &mut PageId,
        mut trace: Vec<TraceNode<'_>>,
        separator: u64,
        new_right: PageId,
    ) -> Result<()> {
        let node = trace.pop().expect("trace always contains the root");
        let parent = InternalPage::attach(node.frame);

        if !parent.is_full() {
            parent.right_insert(separator, new_right);
            Self::release(trace);
            return Ok(());
        }

        // The parent is full: split it, hand its promoted key to the
        // grandparent (or a brand-new root), then route the original
        // separator into whichever half now spans it.
        let right_guard = PageGuard::adopt(pool, pool.new_page()?);
        let (promoted, right) = parent.split_right(right_guard.frame);
        let left = parent;

        if left.id() == *root_id {
            debug_assert!(trace.is_empty(), "the root must be the first trace entry");
            Self::promote_root(pool, root_id, promoted, left.id(), right.id())?;
        } else {
            Self::insert_to_parent(pool, root_id, trace, promoted, right.id())?;
        }

        if separator <= promoted {
            left.right_insert(separator, new_right);
        } else {
            right.right_insert(separator, new_right);
        }

        Ok(())
    }

    /// Replaces the root with a fresh internal node over the two halves of
    /// the old one. The old root's standing pin moves to the new root.
    fn promote_root(
        pool: &BufferPool,
        root_id: &mut PageId,
        separator: u64,
        left: PageId,
        right: PageId,
    ) -> Result<()> {
        let frame = pool.new_page()?;
        let new_root = InternalPage::attach(frame);
        new_root.seed(separator, left, right);

        pool.unpin_page(*root_id, false);
        *root_id = new_root.id();

        tracing::debug!(old_root = %left, new_root = %root_id, "promoted new root");

        Ok(())
    }

    /// Releases trace pins leaf-to-root, the reverse of acquisition order.
    fn release(mut trace: Vec<TraceNode<'_>>) {
        while let Some(node) = trace.pop() {
            drop(node);
        }
    }

    fn load_metadata(directory: &Path) -> Result<PageId> {
        let data = std::fs::read(directory.join(TREE_META_FILE))?;
        if data.len() < 4 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("tree metadata truncated to {} B", data.len()),
            )
            .into());
        }

        Ok(PageId::from_be_bytes([data[0], data[1], data[2], data[3]]))
    }

    fn store_metadata(&self) -> Result<()> {
        std::fs::write(
            self.directory.join(TREE_META_FILE),
            self.root_id.to_be_bytes(),
        )?;
        Ok(())
    }
}

/// ID of the page resident in a pool frame.
fn frame_id(frame: &BufferFrame) -> PageId {
    frame
        .page_id()
        .expect("pool frame handed out without a resident page")
}
