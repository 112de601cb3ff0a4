//! Cadence - Shared Audio Graph
//!
//! One graph per playback element, created on first use and reused by every
//! consumer afterwards:
//!
//! - `GraphRegistry` maps element identity to its `AudioGraphHandle`
//! - `GainNode` carries the crossfade automation (`AudioParam`)
//! - `AnalyserNode` exposes frequency snapshots to visualizers
//! - `AudioContext` is the sample clock automation is scheduled against
//!
//! # Example
//!
//! ```rust
//! use cadence_core::AudioElement;
//! use cadence_graph::GraphRegistry;
//! use std::sync::Arc;
//!
//! let registry = GraphRegistry::default();
//! let element = AudioElement::new();
//!
//! let compact = registry.attach(&element).unwrap();
//! let expanded = registry.attach(&element).unwrap();
//! assert!(Arc::ptr_eq(&compact, &expanded));
//! ```

mod analyser;
mod context;
mod graph;
mod param;
mod registry;

pub use analyser::{AnalyserNode, AnalyserOptions};
pub use context::AudioContext;
pub use graph::{AudioGraphHandle, Edge, GainNode, GraphNode, GraphOptions, TOPOLOGY};
pub use param::AudioParam;
pub use registry::GraphRegistry;
