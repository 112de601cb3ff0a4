//! Cadence - Visualizers
//!
//! Two independent consumers of the playing track:
//!
//! - `FrequencyVisualizer` draws the shared analyser spectrum every frame
//! - `WaveformRenderer` fetches and decodes the whole track once, reduces it
//!   to RMS bars on a worker thread, and paints them against live progress
//!
//! Both draw through the `Canvas` trait; `DisplayList` records the calls and
//! can export them as SVG.

mod cache;
mod canvas;
mod decode;
mod equalizer;
mod frame;
mod layout;
mod waveform;
mod worker;

pub use cache::DecodedCache;
pub use canvas::{Canvas, DisplayList, DrawOp, Fill, Rgba};
pub use decode::{decode_first_channel, DecodedAudio};
pub use equalizer::{bar_color, FrequencyVisualizer, VisualizerSignals};
pub use frame::FrameLoop;
pub use layout::{bar_x, equalizer_bar_count, waveform_bar_count};
pub use waveform::{
    paint, shade_for_bar, BarShade, HoverInfo, LoadOutcome, PaintGeometry, WaveformData,
    WaveformPalette, WaveformRenderer,
};
pub use worker::{rms_bars, spawn_reduction, ReductionRequest};
