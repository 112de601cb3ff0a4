//! Playback element abstraction
//!
//! The playback element is the root resource of the pipeline: the streaming
//! engine fills it, the shared audio graph taps its output, and the waveform
//! renderer seeks it. `PlaybackElement` is the seam; `AudioElement` is the
//! in-process implementation used by the native front end and the tests.

use crate::error::{MediaError, Result};
use crate::types::ElementId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// What the element is currently playing from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ElementSource {
    /// Nothing assigned
    #[default]
    Empty,

    /// Fed incrementally by a streaming session through a sink
    MediaStream { session: u64 },

    /// Native progressive download of a URL
    Url(String),
}

/// Exclusive handle to an element's audio output
///
/// Only one can ever exist per element.
#[derive(Debug)]
pub struct OutputTap {
    element: ElementId,
}

impl OutputTap {
    pub fn element(&self) -> ElementId {
        self.element
    }
}

/// Platform playback element
pub trait PlaybackElement: Send + Sync {
    /// Stable identity of this element
    fn id(&self) -> ElementId;

    /// Current source assignment
    fn source(&self) -> ElementSource;

    /// Replace the source assignment
    ///
    /// Assigning a new source resets the play head to zero.
    fn set_source(&self, source: ElementSource);

    /// Request playback of the current source
    fn play(&self) -> Result<()>;

    /// Pause playback
    fn pause(&self);

    fn is_paused(&self) -> bool;

    /// Play head in seconds
    fn current_time(&self) -> f64;

    /// Move the play head (clamped to the known duration)
    fn seek(&self, seconds: f64);

    /// Total duration in seconds, once known
    fn duration(&self) -> Option<f64>;

    /// Capture the element's audio output
    ///
    /// # Errors
    /// `MediaError::GraphAttachConflict` if the output was already captured.
    fn capture_output(&self) -> Result<OutputTap>;
}

#[derive(Debug, Default)]
struct ElementState {
    source: ElementSource,
    paused: bool,
    current_time: f64,
    duration: Option<f64>,
    play_requests: u32,
}

/// In-process playback element
#[derive(Debug)]
pub struct AudioElement {
    id: ElementId,
    state: Mutex<ElementState>,
    output_captured: AtomicBool,
}

impl AudioElement {
    /// Create a new, paused element with no source
    pub fn new() -> Self {
        Self {
            id: ElementId::next(),
            state: Mutex::new(ElementState {
                paused: true,
                ..ElementState::default()
            }),
            output_captured: AtomicBool::new(false),
        }
    }

    /// Record the duration once metadata is known
    pub fn set_duration(&self, seconds: Option<f64>) {
        self.lock().duration = seconds.filter(|d| d.is_finite() && *d > 0.0);
    }

    /// Advance the play head by `seconds` while playing
    pub fn advance(&self, seconds: f64) {
        let mut state = self.lock();
        if state.paused {
            return;
        }
        let next = state.current_time + seconds.max(0.0);
        state.current_time = match state.duration {
            Some(duration) => next.min(duration),
            None => next,
        };
    }

    /// Number of `play()` requests received since creation
    pub fn play_requests(&self) -> u32 {
        self.lock().play_requests
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ElementState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AudioElement {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackElement for AudioElement {
    fn id(&self) -> ElementId {
        self.id
    }

    fn source(&self) -> ElementSource {
        self.lock().source.clone()
    }

    fn set_source(&self, source: ElementSource) {
        let mut state = self.lock();
        debug!(element = %self.id, ?source, "Element source assigned");
        state.source = source;
        state.current_time = 0.0;
    }

    fn play(&self) -> Result<()> {
        let mut state = self.lock();
        if state.source == ElementSource::Empty {
            return Err(MediaError::SinkClosed);
        }
        state.paused = false;
        state.play_requests += 1;
        Ok(())
    }

    fn pause(&self) {
        self.lock().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.lock().paused
    }

    fn current_time(&self) -> f64 {
        self.lock().current_time
    }

    fn seek(&self, seconds: f64) {
        let mut state = self.lock();
        let target = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        state.current_time = match state.duration {
            Some(duration) => target.min(duration),
            None => target,
        };
    }

    fn duration(&self) -> Option<f64> {
        self.lock().duration
    }

    fn capture_output(&self) -> Result<OutputTap> {
        if self.output_captured.swap(true, Ordering::AcqRel) {
            return Err(MediaError::GraphAttachConflict(self.id));
        }
        Ok(OutputTap { element: self.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_can_only_be_captured_once() {
        let element = AudioElement::new();
        let tap = element.capture_output().unwrap();
        assert_eq!(tap.element(), element.id());

        match element.capture_output() {
            Err(MediaError::GraphAttachConflict(id)) => assert_eq!(id, element.id()),
            other => panic!("expected attach conflict, got {:?}", other),
        }
    }

    #[test]
    fn play_requires_a_source() {
        let element = AudioElement::new();
        assert!(element.play().is_err());

        element.set_source(ElementSource::Url("http://host/a.webm".into()));
        element.play().unwrap();
        assert!(!element.is_paused());
        assert_eq!(element.play_requests(), 1);
    }

    #[test]
    fn seek_is_clamped_to_duration() {
        let element = AudioElement::new();
        element.set_duration(Some(120.0));
        element.seek(500.0);
        assert_eq!(element.current_time(), 120.0);
        element.seek(-4.0);
        assert_eq!(element.current_time(), 0.0);
    }

    #[test]
    fn advance_only_moves_while_playing() {
        let element = AudioElement::new();
        element.set_source(ElementSource::MediaStream { session: 1 });
        element.advance(1.0);
        assert_eq!(element.current_time(), 0.0);

        element.play().unwrap();
        element.advance(1.5);
        assert_eq!(element.current_time(), 1.5);
    }

    #[test]
    fn new_source_resets_play_head() {
        let element = AudioElement::new();
        element.seek(42.0);
        element.set_source(ElementSource::Url("http://host/b.webm".into()));
        assert_eq!(element.current_time(), 0.0);
    }
}
