//! Per-element audio graph
//!
//! Topology: `source -> gain -> destination` for audible output and
//! `source -> analyser -> destination` for analysis. The analyser is a
//! non-destructive tap; its edge to the destination keeps it pulled by the
//! renderer but adds no signal to the mix.

use crate::analyser::{AnalyserNode, AnalyserOptions};
use crate::context::AudioContext;
use crate::param::AudioParam;
use cadence_core::{ElementId, OutputTap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Nodes of the shared graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphNode {
    Source,
    Gain,
    Analyser,
    Destination,
}

/// Directed connection between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: GraphNode,
    pub to: GraphNode,
}

impl Edge {
    const fn new(from: GraphNode, to: GraphNode) -> Self {
        Self { from, to }
    }
}

/// The fixed wiring every attached element receives
pub const TOPOLOGY: [Edge; 4] = [
    Edge::new(GraphNode::Source, GraphNode::Gain),
    Edge::new(GraphNode::Gain, GraphNode::Destination),
    Edge::new(GraphNode::Source, GraphNode::Analyser),
    Edge::new(GraphNode::Analyser, GraphNode::Destination),
];

/// Graph construction parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphOptions {
    pub sample_rate: u32,
    pub channels: usize,
    pub analyser: AnalyserOptions,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            analyser: AnalyserOptions::default(),
        }
    }
}

/// Gain stage with a unity-default, `[0, 1]`-clamped automation curve
#[derive(Debug)]
pub struct GainNode {
    gain: Mutex<AudioParam>,
}

impl GainNode {
    pub fn new() -> Self {
        Self {
            gain: Mutex::new(AudioParam::new(1.0, 0.0, 1.0)),
        }
    }

    /// Lock the gain parameter for scheduling or inspection
    pub fn gain(&self) -> MutexGuard<'_, AudioParam> {
        self.gain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply the automation curve to an interleaved block starting at `start_time`
    pub fn process(&self, block: &mut [f32], channels: usize, start_time: f64, sample_rate: u32) {
        let channels = channels.max(1);
        let param = self.gain();
        let rate = f64::from(sample_rate.max(1));
        for (frame, samples) in block.chunks_mut(channels).enumerate() {
            let gain = param.value_at(start_time + frame as f64 / rate);
            if gain != 1.0 {
                for sample in samples {
                    *sample *= gain;
                }
            }
        }
    }
}

impl Default for GainNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the one graph attached to a playback element
#[derive(Debug)]
pub struct AudioGraphHandle {
    tap: OutputTap,
    context: AudioContext,
    gain: GainNode,
    analyser: Mutex<AnalyserNode>,
    channels: usize,
}

impl AudioGraphHandle {
    pub(crate) fn new(tap: OutputTap, options: GraphOptions) -> Self {
        Self {
            tap,
            context: AudioContext::new(options.sample_rate),
            gain: GainNode::new(),
            analyser: Mutex::new(AnalyserNode::new(options.analyser)),
            channels: options.channels.max(1),
        }
    }

    /// Element whose output this graph owns
    pub fn element(&self) -> ElementId {
        self.tap.element()
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn gain(&self) -> &GainNode {
        &self.gain
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn topology(&self) -> &'static [Edge] {
        &TOPOLOGY
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.lock_analyser().frequency_bin_count()
    }

    /// Copy the analyser's current byte spectrum into `out`
    pub fn byte_frequency_data(&self, out: &mut [u8]) {
        self.lock_analyser().byte_frequency_data(out);
    }

    /// Allocate and return a byte spectrum snapshot
    pub fn frequency_snapshot(&self) -> Vec<u8> {
        let mut analyser = self.lock_analyser();
        let mut bins = vec![0u8; analyser.frequency_bin_count()];
        analyser.byte_frequency_data(&mut bins);
        bins
    }

    /// Render one interleaved block from the element output to the destination
    ///
    /// `output` must be at least as long as `input`. The analyser sees the
    /// pre-gain signal so crossfade dips never show up as visual flicker.
    pub fn render(&self, input: &[f32], output: &mut [f32]) {
        let len = input.len().min(output.len());
        let frames = len / self.channels;
        let len = frames * self.channels;

        let start_time = self.context.current_time();

        let mono: Vec<f32> = input[..len]
            .chunks(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect();
        self.lock_analyser().push_samples(&mono);

        output[..len].copy_from_slice(&input[..len]);
        self.gain.process(
            &mut output[..len],
            self.channels,
            start_time,
            self.context.sample_rate(),
        );

        self.context.advance(frames as u64);
        self.gain.gain().prune_before(start_time);
    }

    fn lock_analyser(&self) -> MutexGuard<'_, AnalyserNode> {
        self.analyser.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
