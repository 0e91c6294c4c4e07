//! Player configuration.

use std::time::Duration;

/// How many times the player will reconnect after a lost connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Retry forever, with delays taken from the ascending backoff table.
    Unbounded,
    /// Retry at a fixed interval, giving up after this many attempts.
    Bounded(u32),
}

/// How the sink orders appended segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppendMode {
    /// Order by the timestamps carried inside each segment.
    #[default]
    Segments,
    /// Order by arrival: each segment is appended after the previous one.
    Sequence,
}

/// Configuration for a [`Player`](crate::player::Player) instance.
///
/// The target address is the only required field; everything else carries
/// the defaults of the original deployment.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Stream source address.
    pub target: String,
    /// Optional sub-protocol tag sent when opening the connection.
    pub sub_protocol: Option<String>,
    /// Whether a lost connection schedules a reconnect at all.
    pub with_reconnect: bool,
    /// Reconnect budget.
    pub retry_limit: RetryLimit,
    /// Delay between attempts in bounded mode. Unbounded mode ignores this
    /// and uses the backoff table instead.
    pub reconnect_interval: Duration,
    /// How long the connection may stay silent before it is declared dead.
    pub liveness_timeout: Duration,
    /// Segment ordering mode handed to the sink on construction.
    pub append_mode: AppendMode,
    /// Codec tag validated against the sink when the pipeline is built.
    /// Format sniffing happens outside the player.
    pub codec_tag: String,
}

impl PlayerConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            sub_protocol: None,
            with_reconnect: true,
            retry_limit: RetryLimit::Unbounded,
            reconnect_interval: Duration::from_millis(5000),
            liveness_timeout: Duration::from_millis(60000),
            append_mode: AppendMode::default(),
            codec_tag: "video/mp4; codecs=\"avc1.4d0029\"".to_string(),
        }
    }
}
