//! Per-element session supervisor
//!
//! At most one session streams into an element at a time. Starting a new
//! one cancels the previous session and closes its sink before the new task
//! is spawned. A session that finishes on its own releases the active slot,
//! and one that ends `Closed` also closes its sink.

use crate::engine::{IngestionEngine, SessionBindings};
use crate::session::{SessionOutcome, SessionState, StreamSession};
use crate::sink::MediaSink;
use cadence_core::PlaybackElement;
use cadence_graph::AudioGraphHandle;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Final state of a finished session task
#[derive(Debug)]
pub struct SessionReport {
    pub session: StreamSession,
    pub outcome: SessionOutcome,
}

/// Caller's view of a running session
#[derive(Debug)]
pub struct SessionHandle {
    id: u64,
    state: watch::Receiver<SessionState>,
    cancel: CancellationToken,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Latest published state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver for state changes
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Stop the session at its next suspension point
    ///
    /// The session closes its sink and releases the controller's active slot
    /// once it has stopped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the session task to finish
    pub async fn finish(self) -> std::result::Result<SessionReport, JoinError> {
        self.task.await
    }
}

struct ActiveSession {
    id: u64,
    cancel: CancellationToken,
    sink: Arc<dyn MediaSink>,
}

/// Streams tracks into one playback element
pub struct StreamController {
    engine: Arc<IngestionEngine>,
    element: Arc<dyn PlaybackElement>,
    graph: Option<Arc<AudioGraphHandle>>,
    active: Arc<Mutex<Option<ActiveSession>>>,
    next_session: AtomicU64,
}

impl StreamController {
    pub fn new(engine: Arc<IngestionEngine>, element: Arc<dyn PlaybackElement>) -> Self {
        Self {
            engine,
            element,
            graph: None,
            active: Arc::new(Mutex::new(None)),
            next_session: AtomicU64::new(1),
        }
    }

    /// Mask appends with the gain of `graph`
    pub fn with_graph(mut self, graph: Arc<AudioGraphHandle>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn element(&self) -> &Arc<dyn PlaybackElement> {
        &self.element
    }

    /// Start streaming `url` through `sink`, superseding any running session
    ///
    /// Must be called from within a tokio runtime.
    pub fn play(&self, url: &str, sink: Arc<dyn MediaSink>) -> SessionHandle {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        {
            let mut active = self.lock();
            if let Some(previous) = active.take() {
                debug!(superseded = previous.id, by = id, "Superseding stream session");
                previous.cancel.cancel();
                previous.sink.close();
            }
            *active = Some(ActiveSession {
                id,
                cancel: cancel.clone(),
                sink: Arc::clone(&sink),
            });
        }

        let mut session = self.engine.session(id, url);
        let state = session.subscribe();
        let bindings = SessionBindings {
            element: Arc::clone(&self.element),
            sink,
            graph: self.graph.clone(),
            cancel: cancel.clone(),
        };
        let engine = Arc::clone(&self.engine);
        let slot = Arc::clone(&self.active);

        let task = tokio::spawn(async move {
            let outcome = engine.run(&mut session, &bindings).await;
            if matches!(outcome, SessionOutcome::Closed) {
                bindings.sink.close();
            }
            release_slot(&slot, id);
            SessionReport { session, outcome }
        });

        SessionHandle {
            id,
            state,
            cancel,
            task,
        }
    }

    /// Cancel the running session and close its sink
    pub fn stop(&self) {
        if let Some(previous) = self.lock().take() {
            debug!(session = previous.id, "Stopping stream session");
            previous.cancel.cancel();
            previous.sink.close();
        }
    }

    /// Id of the session currently allowed to touch the element
    pub fn active_session(&self) -> Option<u64> {
        self.lock().as_ref().map(|active| active.id)
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        lock_slot(&self.active)
    }
}

fn lock_slot(slot: &Mutex<Option<ActiveSession>>) -> MutexGuard<'_, Option<ActiveSession>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clear the active slot if it still belongs to session `id`
fn release_slot(slot: &Mutex<Option<ActiveSession>>, id: u64) {
    let mut active = lock_slot(slot);
    if active.as_ref().is_some_and(|current| current.id == id) {
        debug!(session = id, "Stream session released");
        *active = None;
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.stop();
    }
}
