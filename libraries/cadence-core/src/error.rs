/// Core error types for the Cadence media pipeline
use crate::types::ElementId;
use thiserror::Error;

/// Result type alias using `MediaError`
pub type Result<T> = std::result::Result<T, MediaError>;

/// Errors raised anywhere in the media pipeline
///
/// Encoding and append problems are normally recovered by the streaming engine
/// (it falls back to direct playback); network and decode failures surface to
/// the caller as retryable conditions.
#[derive(Error, Debug)]
pub enum MediaError {
    /// A ranged or full read of the track resource failed
    #[error("Network read failed for {url}: {reason}")]
    NetworkReadFailure { url: String, reason: String },

    /// The negotiated container/codec cannot be buffered incrementally
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// The sink refused appended data
    #[error("Append rejected: {0}")]
    AppendRejected(String),

    /// Decoding the resource to PCM failed
    #[error("Decode failed: {0}")]
    DecodeFailure(String),

    /// The background reduction worker failed or vanished
    #[error("Worker failed: {0}")]
    WorkerFailure(String),

    /// The element output was already captured by another graph
    #[error("Audio graph already attached to element {0}")]
    GraphAttachConflict(ElementId),

    /// The sink was closed while an operation was pending
    #[error("Sink closed")]
    SinkClosed,

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create a network read failure for `url`
    pub fn network(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::NetworkReadFailure {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a caller may reasonably retry with a fresh session or load
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkReadFailure { .. } | Self::DecodeFailure(_)
        )
    }
}

impl From<config::ConfigError> for MediaError {
    fn from(err: config::ConfigError) -> Self {
        MediaError::Config(err.to_string())
    }
}
