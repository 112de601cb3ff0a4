//! Incremental buffering sink
//!
//! The sink is what the element plays from during chunked delivery. It opens
//! asynchronously after being attached, accepts one source buffer, and
//! processes appends one at a time.

use crate::capability::normalize_mime;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use cadence_core::{ElementSource, MediaError, PlaybackElement, Result};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Lifecycle of a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkReadyState {
    /// Created, not yet attached to an element
    Pending,
    /// Accepting a source buffer and appends
    Open,
    /// End of stream signalled; buffered data stays playable
    Ended,
    /// Detached or discarded; every further operation fails
    Closed,
}

/// Incremental buffering sink attached to a playback element
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Point `element` at this sink for session `session`
    fn attach(&self, element: &dyn PlaybackElement, session: u64);

    /// Resolve once the sink is open
    ///
    /// # Errors
    /// `MediaError::SinkClosed` if the sink closes before opening.
    async fn opened(&self) -> Result<()>;

    /// Create the single source buffer for `mime`
    ///
    /// # Errors
    /// `MediaError::UnsupportedEncoding` if `mime` cannot be buffered,
    /// `MediaError::SinkClosed` if the sink is not open.
    fn add_source_buffer(&self, mime: &str) -> Result<()>;

    fn ready_state(&self) -> SinkReadyState;

    fn is_open(&self) -> bool {
        self.ready_state() == SinkReadyState::Open
    }

    /// Resolve once no append is in progress
    async fn wait_idle(&self);

    /// Append one chunk to the source buffer
    ///
    /// # Errors
    /// `MediaError::AppendRejected` if the data is refused,
    /// `MediaError::SinkClosed` if the sink closed before the append landed.
    async fn append(&self, data: Bytes) -> Result<()>;

    /// Mark the stream complete
    ///
    /// # Errors
    /// `MediaError::SinkClosed` if the sink is not open.
    fn end_of_stream(&self) -> Result<()>;

    /// Detach and discard the sink
    fn close(&self);
}

#[derive(Debug)]
struct SinkInner {
    ready: SinkReadyState,
    mime: Option<String>,
    updating: bool,
    data: BytesMut,
    appends: usize,
}

/// In-process `MediaSink` that accumulates appended bytes
///
/// Appends complete asynchronously (one scheduler turn later), mirroring a
/// sink whose buffer update happens off the caller's stack.
#[derive(Debug)]
pub struct BufferedSink {
    inner: Mutex<SinkInner>,
    notify: Notify,
    supported_types: Vec<String>,
    quota: Option<usize>,
}

impl BufferedSink {
    /// Sink accepting source buffers of `supported_types`
    pub fn new<I, S>(supported_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            inner: Mutex::new(SinkInner {
                ready: SinkReadyState::Pending,
                mime: None,
                updating: false,
                data: BytesMut::new(),
                appends: 0,
            }),
            notify: Notify::new(),
            supported_types: supported_types
                .into_iter()
                .map(|mime| normalize_mime(mime.as_ref()))
                .collect(),
            quota: None,
        }
    }

    /// Reject appends that would grow the buffer past `bytes`
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Copy of everything appended so far
    pub fn buffered(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock().data)
    }

    pub fn buffered_len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn append_count(&self) -> usize {
        self.lock().appends
    }

    /// MIME type of the source buffer, once created
    pub fn mime(&self) -> Option<String> {
        self.lock().mime.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MediaSink for BufferedSink {
    fn attach(&self, element: &dyn PlaybackElement, session: u64) {
        element.set_source(ElementSource::MediaStream { session });

        let mut inner = self.lock();
        if inner.ready == SinkReadyState::Pending {
            inner.ready = SinkReadyState::Open;
            debug!(session, element = %element.id(), "Sink opened");
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    async fn opened(&self) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            match self.ready_state() {
                SinkReadyState::Open | SinkReadyState::Ended => return Ok(()),
                SinkReadyState::Closed => return Err(MediaError::SinkClosed),
                SinkReadyState::Pending => notified.await,
            }
        }
    }

    fn add_source_buffer(&self, mime: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.ready != SinkReadyState::Open {
            return Err(MediaError::SinkClosed);
        }
        if inner.mime.is_some() {
            return Err(MediaError::AppendRejected(
                "source buffer already created".to_string(),
            ));
        }

        let wanted = normalize_mime(mime);
        if !self.supported_types.iter().any(|t| *t == wanted) {
            return Err(MediaError::UnsupportedEncoding(mime.to_string()));
        }

        inner.mime = Some(mime.to_string());
        Ok(())
    }

    fn ready_state(&self) -> SinkReadyState {
        self.lock().ready
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            {
                let inner = self.lock();
                if !inner.updating || inner.ready != SinkReadyState::Open {
                    return;
                }
            }
            notified.await;
        }
    }

    async fn append(&self, data: Bytes) -> Result<()> {
        {
            let mut inner = self.lock();
            if inner.ready != SinkReadyState::Open {
                return Err(MediaError::SinkClosed);
            }
            if inner.mime.is_none() {
                return Err(MediaError::AppendRejected(
                    "no source buffer".to_string(),
                ));
            }
            if inner.updating {
                return Err(MediaError::AppendRejected(
                    "previous append still updating".to_string(),
                ));
            }
            if let Some(quota) = self.quota {
                if inner.data.len() + data.len() > quota {
                    return Err(MediaError::AppendRejected(format!(
                        "buffer quota of {} bytes exceeded",
                        quota
                    )));
                }
            }
            inner.updating = true;
        }

        tokio::task::yield_now().await;

        let result = {
            let mut inner = self.lock();
            inner.updating = false;
            if inner.ready == SinkReadyState::Open {
                inner.data.extend_from_slice(&data);
                inner.appends += 1;
                trace!(len = data.len(), total = inner.data.len(), "Append landed");
                Ok(())
            } else {
                Err(MediaError::SinkClosed)
            }
        };
        self.notify.notify_waiters();
        result
    }

    fn end_of_stream(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.ready != SinkReadyState::Open {
            return Err(MediaError::SinkClosed);
        }
        inner.ready = SinkReadyState::Ended;
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }

    fn close(&self) {
        let mut inner = self.lock();
        if inner.ready != SinkReadyState::Closed {
            inner.ready = SinkReadyState::Closed;
            debug!(buffered = inner.data.len(), "Sink closed");
        }
        drop(inner);
        self.notify.notify_waiters();
    }
}
