//! FIFO buffer of segments awaiting delivery to the sink.

use std::collections::VecDeque;

use bytes::Bytes;

/// Ordered, unbounded buffer of pending segments.
///
/// Segments are delivered in strict arrival order; nothing is reordered,
/// duplicated, or dropped except by [`SegmentQueue::clear`] during a full
/// reset. Backpressure is handled by sink-window trimming, not by bounding
/// this queue.
#[derive(Debug, Default)]
pub struct SegmentQueue {
    pending: VecDeque<Bytes>,
}

impl SegmentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment in arrival order.
    pub fn push(&mut self, segment: Bytes) {
        self.pending.push_back(segment);
    }

    /// Take the oldest segment. Ownership transfers to the caller; the
    /// queue keeps no reference after hand-off.
    pub fn pop(&mut self) -> Option<Bytes> {
        self.pending.pop_front()
    }

    /// Drop everything. Only used on a full pipeline reset.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
