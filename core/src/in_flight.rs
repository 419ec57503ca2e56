//! Frames-in-flight bookkeeping
//!
//! Tracks frames whose GPU work has been submitted but not yet confirmed
//! complete, and holds replaced size-dependent resources until every frame
//! that could still reference them has retired.

use std::collections::VecDeque;
use std::fmt;

/// Identifier assigned to every submitted frame, strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u64);

impl FrameId {
    /// Identifier of the first frame a renderer submits
    pub const FIRST: FrameId = FrameId(1);

    pub fn next(self) -> FrameId {
        FrameId(self.0 + 1)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bounded queue of in-flight frames plus deferred resource releases.
///
/// Generic over the released resource so the same bookkeeping serves any
/// backend's depth target type.
pub struct InFlightFrames<R> {
    limit: usize,
    pending: VecDeque<FrameId>,
    /// Resources waiting on the tagged frame to complete
    deferred: VecDeque<(FrameId, R)>,
    last_completed: Option<FrameId>,
}

impl<R> InFlightFrames<R> {
    /// `limit` is clamped to at least one frame.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            pending: VecDeque::with_capacity(limit),
            deferred: VecDeque::new(),
            last_completed: None,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// No further frame may be submitted until one retires.
    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.limit
    }

    pub fn oldest(&self) -> Option<FrameId> {
        self.pending.front().copied()
    }

    pub fn newest(&self) -> Option<FrameId> {
        self.pending.back().copied()
    }

    pub fn last_completed(&self) -> Option<FrameId> {
        self.last_completed
    }

    /// Number of resources still waiting for release
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Record a submitted frame. Ids must arrive in increasing order.
    pub fn push(&mut self, frame: FrameId) {
        debug_assert!(
            self.pending.back().is_none_or(|&last| last < frame),
            "frame ids must be submitted in increasing order"
        );
        self.pending.push_back(frame);
    }

    /// Release `resource` once every frame submitted so far has completed.
    ///
    /// Dropped immediately when nothing is in flight. Returns whether the
    /// release was deferred.
    pub fn defer_release(&mut self, resource: R) -> bool {
        match self.pending.back() {
            Some(&frame) => {
                self.deferred.push_back((frame, resource));
                true
            }
            None => {
                drop(resource);
                false
            }
        }
    }

    /// The GPU has finished every frame up to and including `frame`.
    ///
    /// Retires those frames and drops the resources they were holding.
    /// Returns the number of resources released.
    pub fn complete_through(&mut self, frame: FrameId) -> usize {
        while self.pending.front().is_some_and(|&f| f <= frame) {
            self.pending.pop_front();
        }
        if self.last_completed.is_none_or(|last| last < frame) {
            self.last_completed = Some(frame);
        }

        let mut released = 0;
        while self.deferred.front().is_some_and(|(f, _)| *f <= frame) {
            self.deferred.pop_front();
            released += 1;
        }
        released
    }

    /// Forget all in-flight frames and release every deferred resource.
    ///
    /// Only valid once the caller knows the GPU is idle (or gone).
    pub fn clear(&mut self) -> usize {
        self.pending.clear();
        let released = self.deferred.len();
        self.deferred.clear();
        released
    }
}

impl<R> fmt::Debug for InFlightFrames<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightFrames")
            .field("limit", &self.limit)
            .field("pending", &self.pending)
            .field("deferred", &self.deferred.len())
            .field("last_completed", &self.last_completed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_limit_is_at_least_one() {
        let frames: InFlightFrames<()> = InFlightFrames::new(0);
        assert_eq!(frames.limit(), 1);
    }

    #[test]
    fn test_fills_and_retires_in_order() {
        let mut frames: InFlightFrames<()> = InFlightFrames::new(2);
        frames.push(FrameId(1));
        assert!(!frames.is_full());
        frames.push(FrameId(2));
        assert!(frames.is_full());
        assert_eq!(frames.oldest(), Some(FrameId(1)));
        assert_eq!(frames.newest(), Some(FrameId(2)));

        frames.complete_through(FrameId(1));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames.oldest(), Some(FrameId(2)));
        assert_eq!(frames.last_completed(), Some(FrameId(1)));

        frames.complete_through(FrameId(2));
        assert!(frames.is_empty());
    }

    #[test]
    fn test_completion_never_moves_backwards() {
        let mut frames: InFlightFrames<()> = InFlightFrames::new(3);
        frames.complete_through(FrameId(5));
        frames.complete_through(FrameId(3));
        assert_eq!(frames.last_completed(), Some(FrameId(5)));
    }

    #[test]
    fn test_release_without_frames_in_flight_is_immediate() {
        let resource = Rc::new(());
        let mut frames = InFlightFrames::new(2);
        assert!(!frames.defer_release(resource.clone()));
        assert_eq!(Rc::strong_count(&resource), 1);
    }

    #[test]
    fn test_release_waits_for_referencing_frames() {
        let old_depth = Rc::new("depth 400x300");
        let mut frames = InFlightFrames::new(3);
        frames.push(FrameId(1));
        frames.push(FrameId(2));
        assert!(frames.defer_release(old_depth.clone()));
        frames.push(FrameId(3));

        assert_eq!(frames.complete_through(FrameId(1)), 0);
        assert_eq!(Rc::strong_count(&old_depth), 2);

        // Frame 2 was the last one that could have used it.
        assert_eq!(frames.complete_through(FrameId(2)), 1);
        assert_eq!(Rc::strong_count(&old_depth), 1);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_clear_releases_everything() {
        let res = Rc::new(());
        let mut frames = InFlightFrames::new(2);
        frames.push(FrameId(1));
        frames.defer_release(res.clone());
        assert_eq!(frames.clear(), 1);
        assert!(frames.is_empty());
        assert_eq!(Rc::strong_count(&res), 1);
    }

    #[test]
    fn test_frame_id_display() {
        assert_eq!(FrameId(42).to_string(), "#42");
        assert_eq!(FrameId::FIRST.next(), FrameId(2));
    }
}
