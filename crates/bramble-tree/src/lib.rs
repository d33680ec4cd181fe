//! B+ tree key-value store for BrambleDB.
//!
//! The tree indexes 8-byte unsigned integer keys to 10-byte opaque values.
//! Its nodes live directly in buffer-pool pages: [`LeafPage`] and
//! [`InternalPage`] are typed views over a frame's bytes, and [`BTree`] glues
//! traversal, insertion, and node splitting on top of the buffer pool.
//!
//! Entries survive a clean [`BTree::close`] and reopen. Insertions only:
//! updates and deletions are not supported.

mod btree;
mod node;

pub use btree::{BTree, TREE_META_FILE};
pub use node::{
    InternalPage, LeafPage, NodePage, INTERNAL_CHILD_CAPACITY, INTERNAL_KEY_CAPACITY,
    LEAF_KEY_CAPACITY,
};

pub use bramble_common::{BrambleError, Result, StoreConfig, Value};
