//! Player error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Errors that can occur while running a stream player.
#[derive(Error, Debug)]
pub enum PlayerError {
    /// Transport-level failure: the connection errored or closed.
    /// Recoverable by reconnection.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// Liveness failure: the connection stopped delivering data.
    /// Treated exactly like a transport failure.
    #[error("liveness timeout after {idle_ms} ms without data")]
    Liveness { idle_ms: u64 },

    /// The sink rejected a write or trim. Recoverable only by rebuilding
    /// the whole pipeline from a fresh connection.
    #[error("sink rejected operation: {reason}")]
    SinkRejected { reason: String },

    /// The sink does not support the configured codec tag. Fatal.
    #[error("unsupported format `{tag}`")]
    FormatUnsupported { tag: String },

    /// The configured reconnect budget was exceeded. Fatal.
    #[error("reconnect attempts exhausted after {attempts} tries")]
    RetriesExhausted { attempts: u32 },
}

impl PlayerError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn sink_rejected(reason: impl Into<String>) -> Self {
        Self::SinkRejected {
            reason: reason.into(),
        }
    }

    /// Whether the player can recover from this error by rebuilding the
    /// pipeline. Fatal errors are surfaced to the owner exactly once.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Liveness { .. } | Self::SinkRejected { .. } => true,
            Self::FormatUnsupported { .. } | Self::RetriesExhausted { .. } => false,
        }
    }
}
