//! Keyed registry of per-element graphs
//!
//! An element's output can be tapped exactly once, so every consumer goes
//! through `GraphRegistry::attach`, which returns the existing handle when one
//! is already wired.

use crate::graph::{AudioGraphHandle, GraphOptions};
use cadence_core::{ElementId, PlaybackElement, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Registry mapping element identity to its graph
#[derive(Debug)]
pub struct GraphRegistry {
    graphs: Mutex<HashMap<ElementId, Arc<AudioGraphHandle>>>,
    options: GraphOptions,
    constructed: AtomicUsize,
}

impl GraphRegistry {
    pub fn new(options: GraphOptions) -> Self {
        Self {
            graphs: Mutex::new(HashMap::new()),
            options,
            constructed: AtomicUsize::new(0),
        }
    }

    /// Get the element's graph, building it on first use
    ///
    /// The lookup and the construction happen under one lock, so two
    /// consumers attaching in the same tick still produce a single topology.
    ///
    /// # Errors
    /// `MediaError::GraphAttachConflict` if the element output was captured
    /// outside this registry.
    pub fn attach(&self, element: &dyn PlaybackElement) -> Result<Arc<AudioGraphHandle>> {
        let id = element.id();
        let mut graphs = self.lock();

        if let Some(existing) = graphs.get(&id) {
            debug!(element = %id, "Reusing attached audio graph");
            return Ok(Arc::clone(existing));
        }

        let tap = element.capture_output()?;
        let handle = Arc::new(AudioGraphHandle::new(tap, self.options));
        graphs.insert(id, Arc::clone(&handle));
        self.constructed.fetch_add(1, Ordering::Relaxed);

        info!(
            element = %id,
            sample_rate = self.options.sample_rate,
            fft_size = self.options.analyser.fft_size,
            "Audio graph attached"
        );

        Ok(handle)
    }

    /// Graph for `id`, if one is attached
    pub fn get(&self, id: ElementId) -> Option<Arc<AudioGraphHandle>> {
        self.lock().get(&id).cloned()
    }

    /// Forget the graph of an element that is being discarded
    ///
    /// Only call this when the element itself goes away; the element output
    /// stays captured and cannot be attached again.
    pub fn release(&self, id: ElementId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!(element = %id, "Audio graph released");
        }
        removed
    }

    /// Number of graphs built since the registry was created
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ElementId, Arc<AudioGraphHandle>>> {
        self.graphs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for GraphRegistry {
    fn default() -> Self {
        Self::new(GraphOptions::default())
    }
}
