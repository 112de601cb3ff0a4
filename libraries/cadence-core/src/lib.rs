//! Cadence - Core
//!
//! Shared vocabulary of the client-side media pipeline:
//!
//! - `MediaError`, the error taxonomy every pipeline crate reports with
//! - `PlaybackElement` / `AudioElement`, the root playback resource
//! - `ProgressStore` / `ProgressCell`, the externally owned play head
//! - `PipelineConfig`, loaded from `cadence.toml` and `CADENCE_*` variables
//!
//! # Example
//!
//! ```rust
//! use cadence_core::{AudioElement, ElementSource, PlaybackElement};
//!
//! let element = AudioElement::new();
//! element.set_source(ElementSource::Url("https://cdn.example.com/a.webm".into()));
//! element.play().unwrap();
//! assert!(!element.is_paused());
//! ```

pub mod config;
pub mod element;
pub mod error;
pub mod progress;
pub mod types;

pub use config::{EqualizerSettings, PipelineConfig, StreamSettings, WaveformSettings};
pub use element::{AudioElement, ElementSource, OutputTap, PlaybackElement};
pub use error::{MediaError, Result};
pub use progress::{PlaybackProgress, ProgressCell, ProgressStore};
pub use types::{format_time, ElementId, Theme};
