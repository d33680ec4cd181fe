//! Buffer pool management for BrambleDB.
//!
//! This crate provides in-memory page caching with:
//! - A fixed-size pool of frames holding page data
//! - Pin counting and dirty tracking per frame
//! - Pluggable replacement policies (LRU and LFU provided)
//! - Write-back of dirty pages on eviction

mod frame;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use pool::BufferPool;
pub use replacer::{LfuReplacer, LruReplacer, Replacer};
