//! Audio context clock

use std::sync::atomic::{AtomicU64, Ordering};

/// Rendering clock of one audio graph
///
/// Time only advances as frames are rendered, so automation scheduled against
/// `current_time()` lands on exact sample positions.
#[derive(Debug)]
pub struct AudioContext {
    sample_rate: u32,
    frames_rendered: AtomicU64,
}

impl AudioContext {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frames_rendered: AtomicU64::new(0),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Context time in seconds
    pub fn current_time(&self) -> f64 {
        self.frames_rendered() as f64 / f64::from(self.sample_rate)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Acquire)
    }

    /// Context time of the frame `offset` frames after the current one
    pub fn time_of_frame(&self, offset: u64) -> f64 {
        (self.frames_rendered() + offset) as f64 / f64::from(self.sample_rate)
    }

    /// Advance the clock after rendering `frames` frames
    pub fn advance(&self, frames: u64) {
        self.frames_rendered.fetch_add(frames, Ordering::AcqRel);
    }
}
