//! Streaming session state
//!
//! ```text
//! Idle -> Opening -> Fetching <-> Appending -> Ended
//!            |          |            |
//!            |          +--> Errored +--> Fallback
//!            +--> Fallback
//! ```
//!
//! Any state may also stop early when the session is superseded or its sink
//! is closed from outside; the outcome is then `SessionOutcome::Closed`.

use crate::capability::FallbackReason;
use crate::fetch::ByteRange;
use cadence_core::MediaError;
use tokio::sync::watch;
use tracing::debug;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Fetching,
    Appending,
    Ended,
    Fallback,
    Errored,
    Closed,
}

impl SessionState {
    /// No further transitions happen from a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Ended | Self::Fallback | Self::Errored | Self::Closed
        )
    }
}

/// How a session finished
#[derive(Debug)]
pub enum SessionOutcome {
    /// Every byte of the resource reached the sink
    Ended { bytes: u64, appends: u32 },

    /// Chunked delivery was abandoned for direct URL playback
    Fallback(FallbackReason),

    /// A read failed; the session stopped without falling back
    Errored { error: MediaError, retryable: bool },

    /// Superseded or its sink closed externally
    Closed,
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            Self::Ended { .. } => SessionState::Ended,
            Self::Fallback(_) => SessionState::Fallback,
            Self::Errored { .. } => SessionState::Errored,
            Self::Closed => SessionState::Closed,
        }
    }
}

/// One attempt to stream one resource into one element
#[derive(Debug)]
pub struct StreamSession {
    id: u64,
    resource_url: String,
    cursor: u64,
    chunk_size: u64,
    state: SessionState,
    sink_open: bool,
    reads: u32,
    appends: u32,
    bytes_appended: u64,
    state_tx: watch::Sender<SessionState>,
}

impl StreamSession {
    pub fn new(id: u64, resource_url: impl Into<String>, chunk_size: u64) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            id,
            resource_url: resource_url.into(),
            cursor: 0,
            chunk_size: chunk_size.max(1),
            state: SessionState::Idle,
            sink_open: false,
            reads: 0,
            appends: 0,
            bytes_appended: 0,
            state_tx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn resource_url(&self) -> &str {
        &self.resource_url
    }

    /// Offset of the next byte to request
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sink_open(&self) -> bool {
        self.sink_open
    }

    pub fn reads(&self) -> u32 {
        self.reads
    }

    pub fn appends(&self) -> u32 {
        self.appends
    }

    pub fn bytes_appended(&self) -> u64 {
        self.bytes_appended
    }

    /// Observe state changes from another task
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// The next window to read
    pub fn next_range(&self) -> ByteRange {
        ByteRange::new(self.cursor, self.chunk_size)
    }

    pub(crate) fn transition(&mut self, next: SessionState) {
        if self.state == next || self.state.is_terminal() {
            return;
        }
        debug!(session = self.id, from = ?self.state, to = ?next, "Session transition");
        self.state = next;
        self.state_tx.send_replace(next);
    }

    pub(crate) fn set_sink_open(&mut self, open: bool) {
        self.sink_open = open;
    }

    pub(crate) fn record_read(&mut self) {
        self.reads += 1;
    }

    /// Advance the cursor past a chunk that landed in the sink
    pub(crate) fn record_append(&mut self, len: u64) {
        self.cursor += len;
        self.bytes_appended += len;
        self.appends += 1;
    }
}
