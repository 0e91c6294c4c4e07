//! Owner-facing player notifications.
//!
//! The player never throws across its public boundary; everything an owner
//! can observe arrives as a [`PlayerEvent`] on the channel returned by
//! [`Player::spawn`](crate::player::Player::spawn).

use std::time::Duration;

/// Close code surfaced to the owner when a connection ends.
///
/// Carries the remote-supplied close code when one exists, or a sentinel
/// for failures that originated outside the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseCode(pub i32);

impl CloseCode {
    /// Clean close initiated by the remote.
    pub const NORMAL: CloseCode = CloseCode(1000);
    /// Connection died without a close handshake. Also reported for a
    /// liveness expiry, which the player treats exactly like a dead
    /// transport.
    pub const ABNORMAL: CloseCode = CloseCode(1006);
    /// Failure originated outside the connection (e.g. the sink rejected
    /// a write).
    pub const EXTERNAL: CloseCode = CloseCode(-1);
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        CloseCode(i32::from(code))
    }
}

/// Notifications emitted by a player to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// The transport finished opening. First data may still never arrive.
    ConnectionOpen,
    /// The connection closed, for any reason.
    ConnectionClose { code: CloseCode },
    /// A reconnect attempt is about to start.
    ReconnectAttempt { attempt: u32 },
    /// A reconnect was scheduled; `delay` is the backoff before the attempt.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// The player gave up: reconnect budget exhausted or a fatal failure.
    /// Emitted exactly once, with the last known close code.
    Disconnected { code: CloseCode, detail: String },
    /// Sink state is about to be torn down.
    BeforeClear,
    /// Result of the sink format check, once per pipeline build.
    FormatCheck { supported: bool },
}
