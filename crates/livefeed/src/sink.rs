//! Sink adapter seam.
//!
//! The sink is the only collaborator aware of the transport-specific
//! buffering primitive. It accepts one pending operation at a time and
//! reports completion or failure asynchronously through a [`SinkReporter`].
//! The player never inspects segment contents.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::PlayerConfig;
use crate::player::Event;

/// The feed driver's view of the sink.
///
/// Transitions are driven only by adapter completion/error callbacks,
/// never guessed from elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Can accept one write or trim.
    Idle,
    /// A write or trim is in flight.
    Busy,
    /// No further operations possible until the pipeline is rebuilt.
    Closed,
}

/// Completion callbacks from the sink, delivered into the player's
/// dispatch loop.
#[derive(Debug, Clone)]
pub(crate) enum SinkEvent {
    WriteComplete,
    TrimComplete,
    Error { reason: String },
    Closed,
}

/// Handed to a sink adapter at construction; the adapter reports every
/// operation outcome through it. Reports from a torn-down pipeline are
/// silently discarded.
#[derive(Debug, Clone)]
pub struct SinkReporter {
    tx: mpsc::UnboundedSender<Event>,
    epoch: u64,
}

impl SinkReporter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Event>, epoch: u64) -> Self {
        Self { tx, epoch }
    }

    fn report(&self, event: SinkEvent) {
        let _ = self.tx.send(Event::Sink {
            epoch: self.epoch,
            event,
        });
    }

    /// The pending write finished and the sink can accept the next operation.
    pub fn write_complete(&self) {
        self.report(SinkEvent::WriteComplete);
    }

    /// The pending trim finished.
    pub fn trim_complete(&self) {
        self.report(SinkEvent::TrimComplete);
    }

    /// The pending operation failed. The player rebuilds the whole
    /// pipeline; the operation is never retried at this granularity.
    pub fn error(&self, reason: impl Into<String>) {
        self.report(SinkEvent::Error {
            reason: reason.into(),
        });
    }

    /// The sink closed on its own (e.g. the underlying media pipeline
    /// died). Handled like a fatal error.
    pub fn closed(&self) {
        self.report(SinkEvent::Closed);
    }
}

/// Buffering/playback primitive consuming segments in order.
///
/// `write` and `trim` must each be answered by exactly one reporter call.
/// At most one operation is ever submitted before its completion arrives.
pub trait SinkAdapter: Send {
    /// Whether this sink can play the given codec tag.
    fn is_format_supported(&self, codec_tag: &str) -> bool;

    /// Submit one segment. Completion or rejection arrives via the reporter.
    fn write(&mut self, segment: Bytes);

    /// Discard the retained range `[from, to)`.
    fn trim(&mut self, from: f64, to: f64);

    /// Whether an operation is currently in flight inside the adapter.
    fn is_busy(&self) -> bool;

    /// Retained playable range `[start, end)`, if anything is buffered.
    fn retained(&self) -> Option<(f64, f64)>;

    /// Current playback position.
    fn position(&self) -> f64;

    /// Jump playback to the given position (stall correction).
    fn set_position(&mut self, position: f64);

    /// Tear the sink down. No reporter calls may follow.
    fn shutdown(&mut self);
}

/// Builds a fresh sink adapter for each pipeline. The sink is rebuilt on
/// every reconnect.
pub type SinkFactory =
    Box<dyn FnMut(&PlayerConfig, SinkReporter) -> Box<dyn SinkAdapter> + Send + 'static>;
