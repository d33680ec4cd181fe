//! Configuration structures for BrambleDB.

use crate::error::{BrambleError, Result};
use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Maximum supported buffer-pool memory budget (1 GiB).
pub const MAX_MEMORY: usize = 1 << 30;

/// Configuration for a BrambleDB store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Total buffer-pool byte budget. The pool holds
    /// `memory_size / PAGE_SIZE` frames.
    pub memory_size: usize,
    /// Filesystem path holding the store's on-disk state.
    pub working_directory: PathBuf,
}

impl StoreConfig {
    /// Creates a configuration with the given memory budget and directory.
    pub fn new(memory_size: usize, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            memory_size,
            working_directory: working_directory.into(),
        }
    }

    /// Creates a configuration sized to 25 % of available system RAM,
    /// clamped to [`MAX_MEMORY`]. Minimum of 64 pages so that even
    /// low-memory systems get a useful cache.
    pub fn auto_sized(working_directory: impl Into<PathBuf>) -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();

        let target = (sys.available_memory() as usize / 4).min(MAX_MEMORY);
        let memory_size = target.max(64 * PAGE_SIZE);

        Self::new(memory_size, working_directory)
    }

    /// Number of buffer-pool frames this configuration yields.
    pub fn frame_count(&self) -> usize {
        self.memory_size / PAGE_SIZE
    }

    /// Checks that the configuration is usable: nonzero memory budget of at
    /// most [`MAX_MEMORY`], and a non-empty working directory.
    pub fn validate(&self) -> Result<()> {
        if self.memory_size == 0 || self.memory_size > MAX_MEMORY {
            return Err(BrambleError::InvalidConfig(format!(
                "memory size {} B out of range (0, {}]",
                self.memory_size, MAX_MEMORY
            )));
        }
        if self.working_directory.as_os_str().is_empty() {
            return Err(BrambleError::InvalidConfig(
                "working directory must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
