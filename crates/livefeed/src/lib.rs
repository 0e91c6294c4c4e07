//! Livefeed: resilient client for continuous, segmented binary media
//! streams delivered over a long-lived duplex connection.
//!
//! The player stays connected across transient network failures, detects
//! silent connection death via an idle-based liveness check, buffers
//! incoming segments, and hands them to a playback sink in arrival order
//! while respecting the sink's one-operation-at-a-time readiness.
//!
//! ## Core Types
//!
//! - [`Player`] - one stream, one connection, one sink; command handle
//! - [`PlayerConfig`] - target, reconnect budget, liveness timeout
//! - [`PlayerEvent`] - owner notifications (open, close, reconnect, ...)
//!
//! ## Collaborator Seams
//!
//! - [`StreamSource`] - opens connections; [`WsSource`] is the bundled
//!   websocket implementation
//! - [`SinkAdapter`] - the buffering/playback primitive; reports each
//!   operation outcome through its [`SinkReporter`]
//!
//! ## Policy
//!
//! - [`BackoffPolicy`] - ascending delay table for unbounded retries,
//!   fixed interval with explicit give-up for bounded retries
//! - [`ReconnectState`] / [`transition`] - explicit connection lifecycle
//!   state machine

pub mod backoff;
pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod player;
pub mod proxy;
pub mod queue;
pub mod reconnect;
pub mod sink;
pub mod source;
pub mod ws;

pub use backoff::{Backoff, BackoffPolicy};
pub use config::{AppendMode, PlayerConfig, RetryLimit};
pub use error::{PlayerError, Result};
pub use events::{CloseCode, PlayerEvent};
pub use player::Player;
pub use queue::SegmentQueue;
pub use reconnect::{ReconnectController, ReconnectEvent, ReconnectState, Schedule, transition};
pub use sink::{SinkAdapter, SinkFactory, SinkReporter, SinkState};
pub use source::{SourceConn, SourceEvent, StreamSource};
pub use ws::WsSource;
