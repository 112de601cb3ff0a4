//! Chunked ingestion loop
//!
//! One call to `IngestionEngine::run` drives one session from `Opening` to a
//! terminal state: ranged read, wait for the sink to go idle, duck the gain,
//! append, restore the gain, repeat. Every suspension point is raced against
//! the session's cancellation token, and the sink is re-checked after each
//! one, so a superseded session never touches a sink or element again.

use crate::capability::{DeliveryMode, FallbackReason, PlatformCapabilities};
use crate::crossfade::CrossfadeMask;
use crate::fetch::RangeFetcher;
use crate::session::{SessionOutcome, SessionState, StreamSession};
use crate::sink::MediaSink;
use cadence_core::{ElementSource, MediaError, PlaybackElement, StreamSettings};
use cadence_graph::AudioGraphHandle;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a session acts on besides the resource itself
#[derive(Clone)]
pub struct SessionBindings {
    pub element: Arc<dyn PlaybackElement>,
    pub sink: Arc<dyn MediaSink>,
    /// Shared graph whose gain masks appends; `None` plays unmasked
    pub graph: Option<Arc<AudioGraphHandle>>,
    pub cancel: CancellationToken,
}

/// Drives streaming sessions
pub struct IngestionEngine {
    fetcher: Arc<dyn RangeFetcher>,
    capabilities: PlatformCapabilities,
    settings: StreamSettings,
    mask: CrossfadeMask,
}

impl IngestionEngine {
    pub fn new(
        fetcher: Arc<dyn RangeFetcher>,
        capabilities: PlatformCapabilities,
        settings: StreamSettings,
    ) -> Self {
        let mask = CrossfadeMask::from(&settings);
        Self {
            fetcher,
            capabilities,
            settings,
            mask,
        }
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn capabilities(&self) -> &PlatformCapabilities {
        &self.capabilities
    }

    /// Build a fresh session for `url` using the configured chunk size
    pub fn session(&self, id: u64, url: &str) -> StreamSession {
        StreamSession::new(id, url, self.settings.chunk_size)
    }

    /// Run `session` to a terminal state
    pub async fn run(
        &self,
        session: &mut StreamSession,
        bindings: &SessionBindings,
    ) -> SessionOutcome {
        info!(
            session = session.id(),
            url = %session.resource_url(),
            chunk_size = session.chunk_size(),
            "Stream session starting"
        );

        let outcome = self.drive(session, bindings).await;
        session.set_sink_open(false);
        session.transition(outcome.state());

        match &outcome {
            SessionOutcome::Ended { bytes, appends } => {
                info!(session = session.id(), bytes, appends, "Stream session ended");
            }
            SessionOutcome::Fallback(reason) => {
                warn!(session = session.id(), %reason, "Stream session fell back to direct playback");
            }
            SessionOutcome::Errored { error, retryable } => {
                warn!(session = session.id(), %error, retryable, "Stream session failed");
            }
            SessionOutcome::Closed => {
                debug!(session = session.id(), appends = session.appends(), "Stream session closed");
            }
        }

        outcome
    }

    async fn drive(&self, session: &mut StreamSession, b: &SessionBindings) -> SessionOutcome {
        session.transition(SessionState::Opening);

        let mime = match self.capabilities.select_delivery(&self.settings.mime_type) {
            DeliveryMode::Chunked { mime } => mime,
            DeliveryMode::Direct(reason) => return Self::fall_back(session, b, reason),
        };

        b.sink.attach(b.element.as_ref(), session.id());

        let opened = tokio::select! {
            biased;
            () = b.cancel.cancelled() => return SessionOutcome::Closed,
            opened = b.sink.opened() => opened,
        };
        if opened.is_err() || !live(b) {
            return SessionOutcome::Closed;
        }

        if let Err(error) = b.sink.add_source_buffer(&mime) {
            if !live(b) {
                return SessionOutcome::Closed;
            }
            let reason = match error {
                MediaError::UnsupportedEncoding(mime) => FallbackReason::UnsupportedEncoding(mime),
                other => FallbackReason::UnsupportedEncoding(other.to_string()),
            };
            return Self::fall_back(session, b, reason);
        }
        session.set_sink_open(true);

        loop {
            if !live(b) {
                return SessionOutcome::Closed;
            }

            session.transition(SessionState::Fetching);
            let range = session.next_range();
            let read = tokio::select! {
                biased;
                () = b.cancel.cancelled() => return SessionOutcome::Closed,
                read = self.fetcher.fetch_range(session.resource_url(), range) => read,
            };
            session.record_read();

            let chunk = match read {
                Ok(chunk) => chunk,
                Err(error) => {
                    if !live(b) {
                        return SessionOutcome::Closed;
                    }
                    let retryable = error.is_retryable();
                    return SessionOutcome::Errored { error, retryable };
                }
            };

            if !live(b) {
                return SessionOutcome::Closed;
            }

            if chunk.is_empty() {
                return Self::finish(session, b);
            }

            let len = chunk.len() as u64;
            let short = len < session.chunk_size();

            session.transition(SessionState::Appending);
            tokio::select! {
                biased;
                () = b.cancel.cancelled() => return SessionOutcome::Closed,
                () = b.sink.wait_idle() => {}
            }
            if !live(b) {
                return SessionOutcome::Closed;
            }

            if let Some(graph) = &b.graph {
                self.mask.duck(graph);
            }
            // Not raced against cancellation: the sink resolves every
            // append, and abandoning one would leave it marked updating.
            let appended = b.sink.append(chunk).await;
            if let Some(graph) = &b.graph {
                self.mask.restore(graph);
            }

            if let Err(error) = appended {
                if !live(b) {
                    return SessionOutcome::Closed;
                }
                return Self::fall_back(
                    session,
                    b,
                    FallbackReason::AppendRejected(error.to_string()),
                );
            }

            session.record_append(len);
            debug!(
                session = session.id(),
                cursor = session.cursor(),
                len,
                "Chunk appended"
            );

            if session.appends() == 1 {
                if let Err(error) = b.element.play() {
                    warn!(session = session.id(), %error, "Play after first append failed");
                }
            }

            if short {
                return Self::finish(session, b);
            }
        }
    }

    fn finish(session: &StreamSession, b: &SessionBindings) -> SessionOutcome {
        if let Err(error) = b.sink.end_of_stream() {
            debug!(session = session.id(), %error, "End of stream not signalled");
            return SessionOutcome::Closed;
        }
        SessionOutcome::Ended {
            bytes: session.bytes_appended(),
            appends: session.appends(),
        }
    }

    /// Abandon chunked delivery and hand the URL to the element
    fn fall_back(
        session: &mut StreamSession,
        b: &SessionBindings,
        reason: FallbackReason,
    ) -> SessionOutcome {
        if b.cancel.is_cancelled() {
            return SessionOutcome::Closed;
        }

        session.set_sink_open(false);
        b.sink.close();
        b.element
            .set_source(ElementSource::Url(session.resource_url().to_string()));
        if let Err(error) = b.element.play() {
            warn!(session = session.id(), %error, "Direct playback did not start");
        }

        SessionOutcome::Fallback(reason)
    }
}

/// The session may still touch its sink and element
fn live(b: &SessionBindings) -> bool {
    !b.cancel.is_cancelled() && b.sink.is_open()
}
