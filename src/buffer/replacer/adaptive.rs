//! Adaptive replacement policy: watches the access stream and switches
//! between [`LruReplacer`] and [`FifoReplacer`] as the workload's
//! repeat/sequential ratios cross configured thresholds.
//!
//! Grounded on the original engine's `AdaptiveStrategy` /
//! `AccessPatternAnalyzer`: every `ADAPTIVE_ANALYSIS_INTERVAL` accesses
//! it recomputes `repeat_rate`/`sequential_rate` over a sliding window,
//! proposes a policy, and only commits to a switch after the same
//! recommendation has come back `DECISION_THRESHOLD` times in a row and
//! `MIN_SWITCH_INTERVAL` has elapsed since the last switch.

use std::collections::VecDeque;
use std::time::Instant;

use crate::common::config::{
    ADAPTIVE_ANALYSIS_INTERVAL, DECISION_THRESHOLD, MIN_SWITCH_INTERVAL,
    REPEAT_ACCESS_THRESHOLD, SEQUENTIAL_ACCESS_THRESHOLD,
};
use crate::common::{FrameId, PageId};

use super::{FifoReplacer, LruReplacer, Replacer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    Lru,
    Fifo,
}

/// Tracks repeat and sequential access rates over a sliding window of
/// page accesses.
struct AccessPatternAnalyzer {
    history: VecDeque<PageId>,
    last_page_id: Option<PageId>,
    repeat_count: usize,
    sequential_count: usize,
    total_accesses: usize,
}

impl AccessPatternAnalyzer {
    fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(ADAPTIVE_ANALYSIS_INTERVAL),
            last_page_id: None,
            repeat_count: 0,
            sequential_count: 0,
            total_accesses: 0,
        }
    }

    fn record_access(&mut self, page_id: PageId) {
        self.total_accesses += 1;

        if self.history.contains(&page_id) {
            self.repeat_count += 1;
        }

        if let Some(last) = self.last_page_id {
            if page_id.0 == last.0 + 1 {
                self.sequential_count += 1;
            }
        }

        if self.history.len() == ADAPTIVE_ANALYSIS_INTERVAL {
            self.history.pop_front();
        }
        self.history.push_back(page_id);
        self.last_page_id = Some(page_id);
    }

    /// (repeat_rate, sequential_rate)
    fn pattern_stats(&self) -> (f64, f64) {
        if self.total_accesses == 0 {
            return (0.0, 0.0);
        }
        let total = self.total_accesses as f64;
        (
            self.repeat_count as f64 / total,
            self.sequential_count as f64 / total,
        )
    }

    /// Counters reset on each analysis pass; the access history itself
    /// (used for repeat detection) is preserved.
    fn reset_counters(&mut self) {
        self.repeat_count = 0;
        self.sequential_count = 0;
        self.total_accesses = 0;
    }
}

/// Replacer that delegates to an LRU or FIFO policy, switching between
/// them as the observed workload changes.
pub struct AdaptiveReplacer {
    current: Box<dyn Replacer>,
    current_policy: Policy,
    analyzer: AccessPatternAnalyzer,
    last_switch: Option<Instant>,
    consecutive_decisions: Vec<Policy>,
}

impl AdaptiveReplacer {
    pub fn new() -> Self {
        Self {
            current: Box::new(LruReplacer::new()),
            current_policy: Policy::Lru,
            analyzer: AccessPatternAnalyzer::new(),
            last_switch: None,
            consecutive_decisions: Vec::with_capacity(DECISION_THRESHOLD),
        }
    }

    /// Name of the policy currently in effect ("lru" or "fifo").
    pub fn current_policy(&self) -> &'static str {
        match self.current_policy {
            Policy::Lru => "lru",
            Policy::Fifo => "fifo",
        }
    }

    fn should_analyze(&self) -> bool {
        self.analyzer.total_accesses > 0
            && self.analyzer.total_accesses % ADAPTIVE_ANALYSIS_INTERVAL == 0
    }

    fn make_decision(&self, repeat_rate: f64, sequential_rate: f64) -> Policy {
        if repeat_rate > REPEAT_ACCESS_THRESHOLD {
            Policy::Lru
        } else if sequential_rate > SEQUENTIAL_ACCESS_THRESHOLD {
            Policy::Fifo
        } else {
            self.current_policy
        }
    }

    fn should_switch(&self, recommended: Policy) -> bool {
        if recommended == self.current_policy {
            return false;
        }
        if let Some(last) = self.last_switch {
            if last.elapsed() < MIN_SWITCH_INTERVAL {
                return false;
            }
        }
        self.consecutive_decisions.len() >= DECISION_THRESHOLD
            && self
                .consecutive_decisions
                .iter()
                .rev()
                .take(DECISION_THRESHOLD)
                .all(|&d| d == recommended)
    }

    fn switch_policy(&mut self, new_policy: Policy) {
        let migrated_state = self.current.frames();

        let mut new_replacer: Box<dyn Replacer> = match new_policy {
            Policy::Lru => Box::new(LruReplacer::new()),
            Policy::Fifo => Box::new(FifoReplacer::new()),
        };

        for (frame_id, evictable) in migrated_state {
            new_replacer.record_access(frame_id, PageId::new(0));
            new_replacer.set_evictable(frame_id, evictable);
        }

        self.current = new_replacer;
        self.current_policy = new_policy;
        self.last_switch = Some(Instant::now());
    }

    fn analyze_and_decide(&mut self) {
        let (repeat_rate, sequential_rate) = self.analyzer.pattern_stats();
        let recommended = self.make_decision(repeat_rate, sequential_rate);

        self.consecutive_decisions.push(recommended);
        if self.consecutive_decisions.len() > DECISION_THRESHOLD {
            self.consecutive_decisions.remove(0);
        }

        if self.should_switch(recommended) {
            self.switch_policy(recommended);
        }

        self.analyzer.reset_counters();
    }
}

impl Default for AdaptiveReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for AdaptiveReplacer {
    fn record_access(&mut self, frame_id: FrameId, page_id: PageId) {
        self.analyzer.record_access(page_id);
        if self.should_analyze() {
            self.analyze_and_decide();
        }
        self.current.record_access(frame_id, page_id);
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        self.current.set_evictable(frame_id, evictable);
    }

    fn evict(&mut self) -> Option<FrameId> {
        self.current.evict()
    }

    fn remove(&mut self, frame_id: FrameId) {
        self.current.remove(frame_id);
    }

    fn clear(&mut self) {
        self.current.clear();
        self.analyzer = AccessPatternAnalyzer::new();
    }

    fn contains(&self, frame_id: FrameId) -> bool {
        self.current.contains(frame_id)
    }

    fn len(&self) -> usize {
        self.current.len()
    }

    fn frames(&self) -> Vec<(FrameId, bool)> {
        self.current.frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adaptive_defaults_to_lru() {
        let replacer = AdaptiveReplacer::new();
        assert_eq!(replacer.current_policy(), "lru");
    }

    #[test]
    fn test_adaptive_delegates_basic_eviction() {
        let mut replacer = AdaptiveReplacer::new();

        replacer.record_access(FrameId::new(0), PageId::new(1));
        replacer.record_access(FrameId::new(1), PageId::new(2));
        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        assert_eq!(replacer.len(), 2);
        assert!(replacer.evict().is_some());
    }

    #[test]
    fn test_adaptive_switches_to_fifo_on_sequential_workload() {
        let mut replacer = AdaptiveReplacer::new();

        // Feed a perfectly sequential access stream for long enough
        // that several analysis windows recommend FIFO in a row.
        let mut page = 1u32;
        for _ in 0..(ADAPTIVE_ANALYSIS_INTERVAL * (DECISION_THRESHOLD + 2)) {
            let frame = FrameId::new((page % 8) as usize);
            replacer.record_access(frame, PageId::new(page));
            replacer.set_evictable(frame, true);
            page += 1;
        }

        assert_eq!(replacer.current_policy(), "fifo");
    }

    #[test]
    fn test_analyzer_pattern_stats() {
        let mut analyzer = AccessPatternAnalyzer::new();
        analyzer.record_access(PageId::new(1));
        analyzer.record_access(PageId::new(2));
        analyzer.record_access(PageId::new(1));

        let (repeat_rate, _) = analyzer.pattern_stats();
        assert!(repeat_rate > 0.0);
    }
}
