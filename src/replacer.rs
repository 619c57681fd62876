use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use crate::log_trace;

pub type FrameId = usize;

#[derive(Debug, PartialEq, Eq)]
pub enum ReplacerError {
    /// Frame id outside `[0, num_frames)`.
    InvalidFrame(FrameId),
    /// `remove` was called on a tracked frame that is not evictable.
    NonEvictable(FrameId),
}

impl std::fmt::Display for ReplacerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplacerError::InvalidFrame(id) => write!(f, "[LRU-K] frame {} out of range", id),
            ReplacerError::NonEvictable(id) => write!(f, "[LRU-K] frame {} is not evictable", id),
        }
    }
}

impl std::error::Error for ReplacerError {}

struct LruKNode {
    /// Access timestamps, most recent first. Once a frame has matured (k or
    /// more accesses) only the k most recent are retained; before that the
    /// full history stays so the oldest access is available for tie-breaks.
    history: VecDeque<u64>,
    evictable: bool,
}

struct ReplacerInner {
    /// BTreeMap so eviction scans frames in ascending id order, which makes
    /// the smallest-id tie-break fall out of a strictly-greater comparison.
    nodes: BTreeMap<FrameId, LruKNode>,
    current_ts: u64,
    evictable_count: usize,
}

/// LRU-K replacement policy over the pool's frames.
///
/// The victim is the evictable frame with the greatest backward k-distance:
/// the elapsed logical time since its k-th most recent access. A frame with
/// fewer than k accesses has infinite distance and is preferred over every
/// matured frame; among those, the one with the earliest overall access goes
/// first. Time is a logical counter bumped on every recorded access.
pub struct LruKReplacer {
    num_frames: usize,
    k: usize,
    inner: Mutex<ReplacerInner>,
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "k must be at least 1");
        LruKReplacer {
            num_frames,
            k,
            inner: Mutex::new(ReplacerInner {
                nodes: BTreeMap::new(),
                current_ts: 0,
                evictable_count: 0,
            }),
        }
    }

    fn check_frame(&self, frame_id: FrameId) -> Result<(), ReplacerError> {
        if frame_id >= self.num_frames {
            return Err(ReplacerError::InvalidFrame(frame_id));
        }
        Ok(())
    }

    /// Record an access to `frame_id` at the current logical time. A frame
    /// seen for the first time starts out non-evictable.
    pub fn record_access(&self, frame_id: FrameId) -> Result<(), ReplacerError> {
        self.check_frame(frame_id)?;
        let mut inner = self.inner.lock().unwrap();
        let ts = inner.current_ts;
        inner.current_ts += 1;
        let node = inner.nodes.entry(frame_id).or_insert_with(|| LruKNode {
            history: VecDeque::new(),
            evictable: false,
        });
        node.history.push_front(ts);
        if node.history.len() > self.k {
            node.history.truncate(self.k);
        }
        log_trace!("access frame({}) @ {}", frame_id, ts);
        Ok(())
    }

    /// Flip a tracked frame's evictable flag. No-op for untracked frames and
    /// for unchanged flags.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<(), ReplacerError> {
        self.check_frame(frame_id)?;
        let mut inner = self.inner.lock().unwrap();
        let node = match inner.nodes.get_mut(&frame_id) {
            Some(node) => node,
            None => return Ok(()),
        };
        if node.evictable == evictable {
            return Ok(());
        }
        node.evictable = evictable;
        if evictable {
            inner.evictable_count += 1;
        } else {
            inner.evictable_count -= 1;
        }
        Ok(())
    }

    /// Choose the victim with the greatest backward k-distance, drop its
    /// record, and return its id. `None` when nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.current_ts;

        // Best immature frame (< k accesses, +inf distance) by earliest
        // overall access, and best matured frame by distance. Any immature
        // frame beats every matured one.
        let mut best_immature: Option<(FrameId, u64)> = None;
        let mut best_matured: Option<(FrameId, u64)> = None;

        for (&frame_id, node) in inner.nodes.iter() {
            if !node.evictable {
                continue;
            }
            if node.history.len() < self.k {
                let oldest = *node.history.back().unwrap();
                match best_immature {
                    Some((_, best_oldest)) if oldest >= best_oldest => {}
                    _ => best_immature = Some((frame_id, oldest)),
                }
            } else {
                let kth_recent = node.history[self.k - 1];
                let distance = now - kth_recent;
                match best_matured {
                    // Strictly greater keeps the smallest id on equal distances
                    // (the map is scanned in ascending id order).
                    Some((_, best_distance)) if distance <= best_distance => {}
                    _ => best_matured = Some((frame_id, distance)),
                }
            }
        }

        let victim = best_immature.or(best_matured).map(|(frame_id, _)| frame_id)?;
        inner.nodes.remove(&victim);
        inner.evictable_count -= 1;
        log_trace!("evict frame({})", victim);
        Some(victim)
    }

    /// Forcibly drop an evictable frame's record, e.g. when its page is
    /// deleted. Untracked frames are a no-op.
    pub fn remove(&self, frame_id: FrameId) -> Result<(), ReplacerError> {
        self.check_frame(frame_id)?;
        let mut inner = self.inner.lock().unwrap();
        let node = match inner.nodes.get(&frame_id) {
            Some(node) => node,
            None => return Ok(()),
        };
        if !node.evictable {
            return Err(ReplacerError::NonEvictable(frame_id));
        }
        inner.nodes.remove(&frame_id);
        inner.evictable_count -= 1;
        Ok(())
    }

    /// Number of frames currently eligible for eviction.
    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().evictable_count
    }

    pub fn is_evictable(&self, frame_id: FrameId) -> bool {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .get(&frame_id)
            .map_or(false, |node| node.evictable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untracked_frame_starts_non_evictable() {
        let replacer = LruKReplacer::new(4, 2);
        replacer.record_access(0).unwrap();
        assert!(!replacer.is_evictable(0));
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_invalid_frame_is_rejected() {
        let replacer = LruKReplacer::new(4, 2);
        assert_eq!(
            replacer.record_access(4),
            Err(ReplacerError::InvalidFrame(4))
        );
        assert_eq!(
            replacer.set_evictable(7, true),
            Err(ReplacerError::InvalidFrame(7))
        );
        assert_eq!(replacer.remove(9), Err(ReplacerError::InvalidFrame(9)));
    }

    #[test]
    fn test_set_evictable_tracks_size() {
        let replacer = LruKReplacer::new(4, 2);
        replacer.record_access(0).unwrap();
        replacer.record_access(1).unwrap();
        replacer.set_evictable(0, true).unwrap();
        assert_eq!(replacer.size(), 1);
        // Unchanged flag is a no-op.
        replacer.set_evictable(0, true).unwrap();
        assert_eq!(replacer.size(), 1);
        replacer.set_evictable(1, true).unwrap();
        assert_eq!(replacer.size(), 2);
        replacer.set_evictable(0, false).unwrap();
        assert_eq!(replacer.size(), 1);
        // Untracked frame is a no-op.
        replacer.set_evictable(3, true).unwrap();
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    fn test_immature_frames_evicted_by_oldest_access() {
        // Access order: a, b, c, a (frames 0, 1, 2). With k = 2, frame 0 has
        // matured while 1 and 2 still have infinite distance; 1 has the
        // earliest overall access and goes first.
        let replacer = LruKReplacer::new(4, 2);
        replacer.record_access(0).unwrap();
        replacer.record_access(1).unwrap();
        replacer.record_access(2).unwrap();
        replacer.record_access(0).unwrap();
        for frame_id in 0..3 {
            replacer.set_evictable(frame_id, true).unwrap();
        }

        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(0));
        assert_eq!(replacer.evict(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_backward_k_distance() {
        // a@0, b@1, a@2, b@3, a@4 with k = 2. At eviction time, a's second
        // most recent access is 2 and b's is 1, so b has the greater
        // backward distance and is evicted first.
        let replacer = LruKReplacer::new(4, 2);
        replacer.record_access(0).unwrap();
        replacer.record_access(1).unwrap();
        replacer.record_access(0).unwrap();
        replacer.record_access(1).unwrap();
        replacer.record_access(0).unwrap();
        replacer.set_evictable(0, true).unwrap();
        replacer.set_evictable(1, true).unwrap();

        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(0));
    }

    #[test]
    fn test_history_trim_keeps_kth_recent() {
        // Frame 0 accessed five times with k = 2: only the two most recent
        // accesses matter. Frame 1 accessed twice, earlier. Frame 1's second
        // most recent access is older, so it goes first.
        let replacer = LruKReplacer::new(4, 2);
        replacer.record_access(1).unwrap();
        replacer.record_access(1).unwrap();
        for _ in 0..5 {
            replacer.record_access(0).unwrap();
        }
        replacer.set_evictable(0, true).unwrap();
        replacer.set_evictable(1, true).unwrap();

        assert_eq!(replacer.evict(), Some(1));
    }

    #[test]
    fn test_evicted_frame_becomes_untracked() {
        let replacer = LruKReplacer::new(4, 1);
        replacer.record_access(0).unwrap();
        replacer.set_evictable(0, true).unwrap();
        assert_eq!(replacer.evict(), Some(0));

        // Re-recording starts a fresh, non-evictable record.
        replacer.record_access(0).unwrap();
        assert!(!replacer.is_evictable(0));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_remove() {
        let replacer = LruKReplacer::new(4, 2);
        replacer.record_access(0).unwrap();
        // Tracked but pinned.
        assert_eq!(replacer.remove(0), Err(ReplacerError::NonEvictable(0)));

        replacer.set_evictable(0, true).unwrap();
        replacer.remove(0).unwrap();
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        // Untracked frame is a no-op.
        replacer.remove(2).unwrap();
    }

    #[test]
    fn test_pinned_frames_are_skipped() {
        let replacer = LruKReplacer::new(4, 1);
        replacer.record_access(0).unwrap();
        replacer.record_access(1).unwrap();
        replacer.set_evictable(1, true).unwrap();
        assert_eq!(replacer.evict(), Some(1));
        // Frame 0 is still pinned.
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_plain_lru_when_k_is_one() {
        let replacer = LruKReplacer::new(4, 1);
        replacer.record_access(0).unwrap();
        replacer.record_access(1).unwrap();
        replacer.record_access(2).unwrap();
        replacer.record_access(0).unwrap();
        for frame_id in 0..3 {
            replacer.set_evictable(frame_id, true).unwrap();
        }

        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(0));
    }
}
