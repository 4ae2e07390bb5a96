//! Eviction policy implementations (replacers).
//!
//! [`Replacer`] is the uniform interface the buffer pool evicts through;
//! any implementation can be swapped in at construction time
//! (`Box<dyn Replacer>`), including at runtime for [`AdaptiveReplacer`],
//! which switches between [`LruReplacer`] and [`FifoReplacer`] under the
//! hood based on observed access patterns.

mod adaptive;
mod fifo;
mod lru;

pub use adaptive::AdaptiveReplacer;
pub use fifo::FifoReplacer;
pub use lru::LruReplacer;

use crate::common::{FrameId, PageId};

/// Frame-granularity eviction policy.
///
/// A replacer tracks which frames are evictable (pin_count == 0) and
/// picks a victim among them on [`Replacer::evict`]. It never itself
/// decides pin counts; the buffer pool calls [`Replacer::set_evictable`]
/// whenever a frame's pin count crosses to or away from zero.
pub trait Replacer: Send {
    /// Record that `frame_id` (holding `page_id`) was just accessed.
    fn record_access(&mut self, frame_id: FrameId, page_id: PageId);

    /// Mark a frame as evictable or not.
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool);

    /// Evict one victim frame, if any evictable frame exists.
    fn evict(&mut self) -> Option<FrameId>;

    /// Remove a frame from the replacer entirely (e.g. on page delete).
    fn remove(&mut self, frame_id: FrameId);

    /// Drop all tracked state.
    fn clear(&mut self);

    /// Whether `frame_id` is currently tracked (evictable or not).
    fn contains(&self, frame_id: FrameId) -> bool;

    /// Number of evictable frames.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every tracked frame and its evictable flag, oldest/least-recent
    /// first. Used only by [`AdaptiveReplacer`] to migrate state when it
    /// switches the underlying policy.
    fn frames(&self) -> Vec<(FrameId, bool)>;
}
