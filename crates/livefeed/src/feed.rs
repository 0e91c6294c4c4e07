//! Feed driver.
//!
//! Decides, on every opportunity, whether to push the next queued segment
//! into the sink, trim the sink's retained window, or hold off. Also owns
//! the single deferred action slot used when a rebuild is requested while
//! a sink operation is in flight.

use bytes::Bytes;
use tracing::debug;

use crate::queue::SegmentQueue;
use crate::sink::{SinkAdapter, SinkState};

/// Once the retained window stretches this far behind the playback
/// position, the next completion trims instead of feeding.
pub const TRIM_THRESHOLD_SECS: f64 = 30.0;

/// How much is kept behind the playback position after a trim.
pub const TRIM_KEEP_SECS: f64 = 10.0;

/// At most one of these may be pending completion of the in-flight sink
/// operation; it runs at the next completion callback instead of
/// interrupting the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeferredAction {
    /// A backoff timer fired mid-write.
    Reconnect,
    /// The owner requested a reset mid-write.
    Reset,
}

/// What to do when the sink reports a completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum FeedDecision {
    Trim { from: f64, to: f64 },
    Feed,
    Hold,
}

/// Trimming and feeding are mutually exclusive per completion event.
pub(crate) fn next_action(
    retained: Option<(f64, f64)>,
    position: f64,
    queue_empty: bool,
) -> FeedDecision {
    if let Some((start, _)) = retained
        && position - start > TRIM_THRESHOLD_SECS
    {
        return FeedDecision::Trim {
            from: start,
            to: position - TRIM_KEEP_SECS,
        };
    }
    if queue_empty {
        FeedDecision::Hold
    } else {
        FeedDecision::Feed
    }
}

/// Segment queue plus the driver's view of the sink.
#[derive(Debug)]
pub(crate) struct FeedDriver {
    queue: SegmentQueue,
    sink_state: SinkState,
    deferred: Option<DeferredAction>,
}

impl FeedDriver {
    pub fn new() -> Self {
        Self {
            queue: SegmentQueue::new(),
            sink_state: SinkState::Closed,
            deferred: None,
        }
    }

    /// A fresh sink was built and can accept operations.
    pub fn sink_ready(&mut self) {
        self.sink_state = SinkState::Idle;
    }

    /// Whether a write or trim is in flight.
    pub fn is_busy(&self) -> bool {
        self.sink_state == SinkState::Busy
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Record one arrived segment in order.
    pub fn enqueue(&mut self, segment: Bytes) {
        self.queue.push(segment);
    }

    /// Mark the in-flight operation as finished.
    pub fn operation_complete(&mut self) {
        if self.sink_state == SinkState::Busy {
            self.sink_state = SinkState::Idle;
        }
    }

    /// Dequeue exactly one segment and issue one write, if the sink is
    /// idle and anything is pending. Returns whether a write was issued.
    pub fn try_feed(&mut self, sink: &mut dyn SinkAdapter) -> bool {
        if self.sink_state != SinkState::Idle {
            return false;
        }
        let Some(segment) = self.queue.pop() else {
            return false;
        };
        self.sink_state = SinkState::Busy;
        sink.write(segment);
        true
    }

    /// Evaluate the retained-window policy, then trim or feed.
    pub fn trim_or_feed(&mut self, sink: &mut dyn SinkAdapter) {
        if self.sink_state != SinkState::Idle {
            return;
        }
        match next_action(sink.retained(), sink.position(), self.queue.is_empty()) {
            FeedDecision::Trim { from, to } => {
                debug!(from, to, "trimming retained window");
                self.sink_state = SinkState::Busy;
                sink.trim(from, to);
            }
            FeedDecision::Feed => {
                self.try_feed(sink);
            }
            FeedDecision::Hold => {}
        }
    }

    /// Park an action until the in-flight operation completes. A newer
    /// request replaces an older one; at most one is ever pending.
    pub fn defer(&mut self, action: DeferredAction) {
        self.deferred = Some(action);
    }

    pub fn take_deferred(&mut self) -> Option<DeferredAction> {
        self.deferred.take()
    }

    /// Full reset: drop buffered segments and the deferred slot, mark the
    /// sink unusable until rebuilt.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.deferred = None;
        self.sink_state = SinkState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        writes: Vec<Bytes>,
        trims: Vec<(f64, f64)>,
        retained: Option<(f64, f64)>,
        position: f64,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                writes: Vec::new(),
                trims: Vec::new(),
                retained: None,
                position: 0.0,
            }
        }
    }

    impl SinkAdapter for RecordingSink {
        fn is_format_supported(&self, _codec_tag: &str) -> bool {
            true
        }
        fn write(&mut self, segment: Bytes) {
            self.writes.push(segment);
        }
        fn trim(&mut self, from: f64, to: f64) {
            self.trims.push((from, to));
        }
        fn is_busy(&self) -> bool {
            false
        }
        fn retained(&self) -> Option<(f64, f64)> {
            self.retained
        }
        fn position(&self) -> f64 {
            self.position
        }
        fn set_position(&mut self, position: f64) {
            self.position = position;
        }
        fn shutdown(&mut self) {}
    }

    #[test]
    fn no_trim_below_threshold() {
        assert_eq!(next_action(Some((0.0, 25.0)), 20.0, false), FeedDecision::Feed);
        assert_eq!(next_action(Some((0.0, 25.0)), 20.0, true), FeedDecision::Hold);
        assert_eq!(next_action(None, 0.0, false), FeedDecision::Feed);
    }

    #[test]
    fn trim_kicks_in_past_threshold() {
        // Window starts 40s behind the playhead: trim down to 10s behind.
        assert_eq!(
            next_action(Some((0.0, 45.0)), 40.0, false),
            FeedDecision::Trim { from: 0.0, to: 30.0 }
        );
        // Trimming wins over feeding even with segments queued.
        assert_eq!(
            next_action(Some((5.0, 60.0)), 50.0, true),
            FeedDecision::Trim {
                from: 5.0,
                to: 40.0
            }
        );
    }

    #[test]
    fn feeds_one_segment_at_a_time() {
        let mut driver = FeedDriver::new();
        let mut sink = RecordingSink::new();
        driver.sink_ready();
        driver.enqueue(Bytes::from_static(b"one"));
        driver.enqueue(Bytes::from_static(b"two"));

        assert!(driver.try_feed(&mut sink));
        assert_eq!(sink.writes.len(), 1);
        assert!(driver.is_busy());

        // Busy sink: nothing further is issued.
        assert!(!driver.try_feed(&mut sink));
        assert_eq!(sink.writes.len(), 1);

        driver.operation_complete();
        assert!(driver.try_feed(&mut sink));
        assert_eq!(sink.writes[1], Bytes::from_static(b"two"));
    }

    #[test]
    fn trim_or_feed_prefers_trim() {
        let mut driver = FeedDriver::new();
        let mut sink = RecordingSink::new();
        sink.retained = Some((0.0, 45.0));
        sink.position = 40.0;
        driver.sink_ready();
        driver.enqueue(Bytes::from_static(b"queued"));

        driver.trim_or_feed(&mut sink);
        assert_eq!(sink.trims, vec![(0.0, 30.0)]);
        assert!(sink.writes.is_empty());
        assert!(driver.is_busy());

        // Feeding resumes on the following completion.
        driver.operation_complete();
        sink.retained = Some((30.0, 45.0));
        driver.trim_or_feed(&mut sink);
        assert_eq!(sink.writes.len(), 1);
    }

    #[test]
    fn closed_sink_accepts_nothing() {
        // No sink_ready yet: the driver refuses to issue anything.
        let mut driver = FeedDriver::new();
        let mut sink = RecordingSink::new();
        driver.enqueue(Bytes::from_static(b"segment"));
        assert!(!driver.try_feed(&mut sink));
        assert!(sink.writes.is_empty());
        assert!(!driver.is_busy());
    }

    #[test]
    fn deferred_slot_holds_at_most_one_action() {
        let mut driver = FeedDriver::new();
        driver.defer(DeferredAction::Reconnect);
        driver.defer(DeferredAction::Reset);
        assert_eq!(driver.take_deferred(), Some(DeferredAction::Reset));
        assert_eq!(driver.take_deferred(), None);
    }
}
