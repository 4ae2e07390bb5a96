//! LRU (Least Recently Used) page replacement policy.
//!
//! Grounded on the original engine's `LRUStrategy` (an `OrderedDict`
//! that moves a key to the end on every `get`/`put`); here the same
//! move-to-back-on-access behavior is built from a `VecDeque` plus a
//! membership set, matching the shape `FifoReplacer` already uses.

use std::collections::{HashSet, VecDeque};

use crate::common::{FrameId, PageId};

use super::Replacer;

/// LRU replacement policy.
///
/// Every access (via [`Replacer::record_access`]) moves the frame to
/// the back of the queue; eviction takes from the front.
pub struct LruReplacer {
    /// Frame IDs ordered from least to most recently accessed.
    queue: VecDeque<FrameId>,

    /// Set of frame IDs that are evictable (pin_count == 0).
    evictable: HashSet<FrameId>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            evictable: HashSet::new(),
        }
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for LruReplacer {
    fn record_access(&mut self, frame_id: FrameId, _page_id: PageId) {
        if let Some(pos) = self.queue.iter().position(|&fid| fid == frame_id) {
            self.queue.remove(pos);
        }
        self.queue.push_back(frame_id);
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
        self.evictable.remove(&frame_id);

        Some(frame_id)
    }

    fn remove(&mut self, frame_id: FrameId) {
        self.evictable.remove(&frame_id);
        if let Some(pos) = self.queue.iter().position(|&fid| fid == frame_id) {
            self.queue.remove(pos);
        }
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.evictable.clear();
    }

    fn contains(&self, frame_id: FrameId) -> bool {
        self.queue.contains(&frame_id)
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
