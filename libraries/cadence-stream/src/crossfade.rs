//! Gain masking around chunk appends
//!
//! Appending to the sink can glitch the element output for a few
//! milliseconds. The mask ducks the shared gain to silence right before an
//! append and ramps it back afterwards:
//!
//! ```text
//! gain
//!  1.0 ─────┐                 ┌───────
//!           │\               /
//!           │ \   append    /
//!  0.0      │  └───────────┘
//!           duck           restore
//!           |-- fade_out --|-- fade_in --|
//! ```
//!
//! Both ramps start from whatever value the curve holds at the current
//! context time, so back-to-back chunks never cause a jump.

use cadence_core::StreamSettings;
use cadence_graph::AudioGraphHandle;
use std::time::Duration;
use tracing::trace;

/// Duck/restore envelope scheduled on a graph's gain node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossfadeMask {
    fade_out: Duration,
    fade_in: Duration,
}

impl CrossfadeMask {
    pub fn new(fade_out: Duration, fade_in: Duration) -> Self {
        Self { fade_out, fade_in }
    }

    pub fn fade_out(&self) -> Duration {
        self.fade_out
    }

    pub fn fade_in(&self) -> Duration {
        self.fade_in
    }

    /// Ramp the gain to silence, starting now
    ///
    /// Returns the context time the ramp reaches zero.
    pub fn duck(&self, graph: &AudioGraphHandle) -> f64 {
        self.ramp(graph, 0.0, self.fade_out)
    }

    /// Ramp the gain back to unity, starting now
    ///
    /// Returns the context time the ramp reaches unity.
    pub fn restore(&self, graph: &AudioGraphHandle) -> f64 {
        self.ramp(graph, 1.0, self.fade_in)
    }

    fn ramp(&self, graph: &AudioGraphHandle, target: f32, over: Duration) -> f64 {
        let now = graph.context().current_time();
        let end = now + over.as_secs_f64();

        let mut gain = graph.gain().gain();
        gain.cancel_and_hold_at_time(now);
        gain.linear_ramp_to_value_at_time(target, end);

        trace!(
            element = %graph.element(),
            from = gain.value_at(now),
            to = target,
            now,
            end,
            "Gain ramp scheduled"
        );

        end
    }
}

impl Default for CrossfadeMask {
    fn default() -> Self {
        Self::from(&StreamSettings::default())
    }
}

impl From<&StreamSettings> for CrossfadeMask {
    fn from(settings: &StreamSettings) -> Self {
        Self::new(settings.fade_out(), settings.fade_in())
    }
}
