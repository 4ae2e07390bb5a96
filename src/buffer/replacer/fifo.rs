//! FIFO (First-In-First-Out) page replacement policy.
//!
//! Pages are evicted in the order they were first brought into the
//! buffer pool; re-accessing a tracked frame does not reorder it.

use std::collections::{HashSet, VecDeque};

use crate::common::{FrameId, PageId};

use super::Replacer;

/// FIFO replacement policy.
pub struct FifoReplacer {
    /// Queue of frame IDs in access order (front = oldest).
    queue: VecDeque<FrameId>,

    /// Set of frame IDs currently in the queue (for O(1) membership check).
    in_queue: HashSet<FrameId>,

    /// Set of frame IDs that are evictable (pin_count == 0).
    evictable: HashSet<FrameId>,
}

impl FifoReplacer {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            in_queue: HashSet::new(),
            evictable: HashSet::new(),
        }
    }
}

impl Default for FifoReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for FifoReplacer {
    fn record_access(&mut self, frame_id: FrameId, _page_id: PageId) {
        if !self.in_queue.contains(&frame_id) {
            self.queue.push_back(frame_id);
            self.in_queue.insert(frame_id);
        }
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if evictable {
            self.evictable.insert(frame_id);
        } else {
            self.evictable.remove(&frame_id);
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        let position = self
            .queue
            .iter()
            .position(|&fid| self.evictable.contains(&fid))?;

        let frame_id = self.queue.remove(position)?;
        self.in_queue.remove(&frame_id);
        self.evictable.remove(&frame_id);

        Some(frame_id)
    }

    fn remove(&mut self, frame_id: FrameId) {
        self.evictable.remove(&frame_id);
        if self.in_queue.remove(&frame_id) {
            self.queue.retain(|&fid| fid != frame_id);
        }
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.in_queue.clear();
        self.evictable.clear();
    }

    fn contains(&self, frame_id: FrameId) -> bool {
        self.in_queue.contains(&frame_id)
    }

    fn len(&self) -> usize {
        self.evictable.len()
    }

    fn frames(&self) -> Vec<(FrameId, bool)> {
        self.queue
            .iter()
            .map(|&fid| (fid, self.evictable.contains(&fid)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_basic() {
        let mut replacer = FifoReplacer::new();

        replacer.record_access(FrameId::new(0), PageId::new(100));
        replacer.record_access(FrameId::new(1), PageId::new(101));
        replacer.record_access(FrameId::new(2), PageId::new(102));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);
        replacer.set_evictable(FrameId::new(2), true);

        assert_eq!(replacer.len(), 3);

        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_fifo_skips_pinned() {
        let mut replacer = FifoReplacer::new();

        replacer.record_access(FrameId::new(0), PageId::new(100));
        replacer.record_access(FrameId::new(1), PageId::new(101));
        replacer.record_access(FrameId::new(2), PageId::new(102));

        replacer.set_evictable(FrameId::new(0), false);
        replacer.set_evictable(FrameId::new(1), true);
        replacer.set_evictable(FrameId::new(2), false);

        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_fifo_remove() {
        let mut replacer = FifoReplacer::new();

        replacer.record_access(FrameId::new(0), PageId::new(100));
        replacer.record_access(FrameId::new(1), PageId::new(101));
        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        replacer.remove(FrameId::new(0));

        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    }

    #[test]
    fn test_fifo_reaccess_no_reorder() {
        let mut replacer = FifoReplacer::new();

        replacer.record_access(FrameId::new(0), PageId::new(100));
        replacer.record_access(FrameId::new(1), PageId::new(101));
        replacer.record_access(FrameId::new(0), PageId::new(100));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    }

    /// Failed eviction attempts must not corrupt the queue: when all
    /// frames are pinned, evict() used to empty the queue, making
    /// future evictions impossible even after unpinning.
    #[test]
    fn test_failed_evict_preserves_queue() {
        let mut replacer = FifoReplacer::new();

        replacer.record_access(FrameId::new(0), PageId::new(100));
        replacer.record_access(FrameId::new(1), PageId::new(101));

        replacer.set_evictable(FrameId::new(0), false);
        replacer.set_evictable(FrameId::new(1), false);

        assert_eq!(replacer.evict(), None);
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(FrameId::new(1), true);
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));

        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_contains_and_clear() {
        let mut replacer = FifoReplacer::new();
        replacer.record_access(FrameId::new(0), PageId::new(100));
        assert!(replacer.contains(FrameId::new(0)));
        assert!(!replacer.contains(FrameId::new(1)));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.clear();
        assert!(!replacer.contains(FrameId::new(0)));
        assert_eq!(replacer.len(), 0);
    }
}
