//! Replacement policies for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// A replacement policy over a set of eviction candidates.
///
/// The buffer pool adds a frame once its page's pin count drops to 0,
/// removes it when the page is pinned again or deleted, and asks for a
/// victim when it needs to reclaim a frame. `victim` must return some member
/// of the current set (and remove it), or `None` if the set is empty.
pub trait Replacer: Send + Sync {
    /// Adds a frame to the set of eviction candidates. Re-adding a frame
    /// already in the set refreshes its standing.
    fn add(&self, frame_id: FrameId);

    /// Removes a frame from the set of eviction candidates.
    fn remove(&self, frame_id: FrameId);

    /// Elects a victim, removing it from the set. Returns `None` if no frame
    /// is eligible.
    fn victim(&self) -> Option<FrameId>;

    /// Returns the number of eviction candidates.
    fn len(&self) -> usize;

    /// Returns true if no frame is eligible for eviction.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct LruInner {
    /// Candidate frames keyed to the logical time they became evictable.
    entries: HashMap<FrameId, u64>,
    clock: u64,
}

/// Least-recently-used replacement: the victim is the candidate that became
/// evictable earliest.
pub struct LruReplacer {
    inner: Mutex<LruInner>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LruInner {
                entries: HashMap::new(),
                clock: 0,
            }),
        }
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for LruReplacer {
    fn add(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let now = inner.clock;
        inner.entries.insert(frame_id, now);
    }

    fn remove(&self, frame_id: FrameId) {
        self.inner.lock().entries.remove(&frame_id);
    }

    fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        let oldest = inner
            .entries
            .iter()
            .min_by_key(|(_, &tick)| tick)
            .map(|(&id, _)| id)?;

        inner.entries.remove(&oldest);
        Some(oldest)
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

struct LfuInner {
    /// Candidate frames keyed to the logical time they became evictable.
    evictable: HashMap<FrameId, u64>,
    /// How many times each frame has become evictable over the replacer's
    /// lifetime. Survives removal so the frequency signal accumulates.
    uses: HashMap<FrameId, u64>,
    clock: u64,
}

/// Least-frequently-used replacement: the victim is the candidate with the
/// fewest recorded uses, ties broken by age.
pub struct LfuReplacer {
    inner: Mutex<LfuInner>,
}

impl LfuReplacer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LfuInner {
                evictable: HashMap::new(),
                uses: HashMap::new(),
                clock: 0,
            }),
        }
    }
}

impl Default for LfuReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for LfuReplacer {
    fn add(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let now = inner.clock;
        *inner.uses.entry(frame_id).or_insert(0) += 1;
        inner.evictable.insert(frame_id, now);
    }

    fn remove(&self, frame_id: FrameId) {
        self.inner.lock().evictable.remove(&frame_id);
    }

    fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        let victim = inner
            .evictable
            .iter()
            .min_by_key(|(id, &tick)| (inner.uses.get(id).copied().unwrap_or(0), tick))
            .map(|(&id, _)| id)?;

        inner.evictable.remove(&victim);
        Some(victim)
    }

    fn len(&self) -> usize {
        self.inner.lock().evictable.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_victim_empty() {
        let replacer = LruReplacer::new();
        assert!(replacer.victim().is_none());
        assert!(replacer.is_empty());
    }

    #[test]
    fn test_lru_evicts_oldest_first() {
        let replacer = LruReplacer::new();

        replacer.add(FrameId(0));
        replacer.add(FrameId(1));
        replacer.add(FrameId(2));
        assert_eq!(replacer.len(), 3);

        assert_eq!(replacer.victim(), Some(FrameId(0)));
        assert_eq!(replacer.victim(), Some(FrameId(1)));
        assert_eq!(replacer.victim(), Some(FrameId(2)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_readd_refreshes_standing() {
        let replacer = LruReplacer::new();

        replacer.add(FrameId(0));
        replacer.add(FrameId(1));
        replacer.add(FrameId(0));
        assert_eq!(replacer.len(), 2);

        assert_eq!(replacer.victim(), Some(FrameId(1)));
        assert_eq!(replacer.victim(), Some(FrameId(0)));
    }

    #[test]
    fn test_lru_remove() {
        let replacer = LruReplacer::new();

        replacer.add(FrameId(0));
        replacer.add(FrameId(1));
        replacer.remove(FrameId(0));

        assert_eq!(replacer.len(), 1);
        assert_eq!(replacer.victim(), Some(FrameId(1)));
    }

    #[test]
    fn test_lru_remove_absent_is_noop() {
        let replacer = LruReplacer::new();
        replacer.remove(FrameId(9));
        assert_eq!(replacer.len(), 0);
    }

    #[test]
    fn test_lfu_victim_empty() {
        let replacer = LfuReplacer::new();
        assert!(replacer.victim().is_none());
    }

    #[test]
    fn test_lfu_evicts_least_used() {
        let replacer = LfuReplacer::new();

        // Frame 0 becomes evictable twice, frame 1 once.
        replacer.add(FrameId(0));
        replacer.remove(FrameId(0));
        replacer.add(FrameId(0));
        replacer.add(FrameId(1));

        assert_eq!(replacer.victim(), Some(FrameId(1)));
        assert_eq!(replacer.victim(), Some(FrameId(0)));
    }

    #[test]
    fn test_lfu_ties_broken_by_age() {
        let replacer = LfuReplacer::new();

        replacer.add(FrameId(3));
        replacer.add(FrameId(4));

        assert_eq!(replacer.victim(), Some(FrameId(3)));
        assert_eq!(replacer.victim(), Some(FrameId(4)));
    }

    #[test]
    fn test_lfu_set_semantics() {
        let replacer = LfuReplacer::new();

        replacer.add(FrameId(0));
        replacer.add(FrameId(0));
        assert_eq!(replacer.len(), 1);

        replacer.remove(FrameId(0));
        assert!(replacer.is_empty());
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_victim_is_member_of_set() {
        for replacer in [
            Box::new(LruReplacer::new()) as Box<dyn Replacer>,
            Box::new(LfuReplacer::new()) as Box<dyn Replacer>,
        ] {
            replacer.add(FrameId(1));
            replacer.add(FrameId(2));

            let victim = replacer.victim().unwrap();
            assert!(victim == FrameId(1) || victim == FrameId(2));
            assert_eq!(replacer.len(), 1);
        }
    }
}
