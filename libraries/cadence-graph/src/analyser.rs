//! Frequency-domain analyser tap
//!
//! Follows the Web Audio `AnalyserNode` recipe: the most recent `fft_size`
//! samples are Blackman-windowed, transformed, normalised by the FFT size,
//! smoothed over time, converted to decibels, and (for byte output) mapped
//! linearly from `[min_decibels, max_decibels]` onto `0..=255`.

use cadence_core::EqualizerSettings;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Analyser construction parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserOptions {
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserOptions {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl From<&EqualizerSettings> for AnalyserOptions {
    fn from(settings: &EqualizerSettings) -> Self {
        Self {
            fft_size: settings.fft_size,
            smoothing_time_constant: settings.smoothing,
            min_decibels: settings.min_decibels,
            max_decibels: settings.max_decibels,
        }
    }
}

/// Analyser node holding the recent time-domain history
pub struct AnalyserNode {
    options: AnalyserOptions,
    history: Vec<f32>,
    write_pos: usize,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    fft: Arc<dyn Fft<f32>>,
}

impl fmt::Debug for AnalyserNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyserNode")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl AnalyserNode {
    /// Create an analyser
    ///
    /// An `fft_size` that is not a power of two is rounded up to one (minimum 32).
    pub fn new(options: AnalyserOptions) -> Self {
        let fft_size = options.fft_size.max(32).next_power_of_two();
        let options = AnalyserOptions { fft_size, ..options };

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            options,
            history: vec![0.0; fft_size],
            write_pos: 0,
            window: blackman_window(fft_size),
            smoothed: vec![0.0; fft_size / 2],
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            fft,
        }
    }

    pub fn options(&self) -> AnalyserOptions {
        self.options
    }

    pub fn fft_size(&self) -> usize {
        self.options.fft_size
    }

    /// Number of frequency bins in a snapshot (half the FFT size)
    pub fn frequency_bin_count(&self) -> usize {
        self.options.fft_size / 2
    }

    /// Feed mono time-domain samples
    pub fn push_samples(&mut self, samples: &[f32]) {
        let len = self.history.len();
        for &sample in samples {
            self.history[self.write_pos] = if sample.is_finite() { sample } else { 0.0 };
            self.write_pos = (self.write_pos + 1) % len;
        }
    }

    /// Fill `out` with the current spectrum in decibels
    pub fn float_frequency_data(&mut self, out: &mut [f32]) {
        self.analyse();
        for (slot, magnitude) in out.iter_mut().zip(&self.smoothed) {
            *slot = to_decibels(*magnitude);
        }
    }

    /// Fill `out` with the current spectrum mapped onto `0..=255`
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        self.analyse();
        let range = self.options.max_decibels - self.options.min_decibels;
        for (slot, magnitude) in out.iter_mut().zip(&self.smoothed) {
            let db = to_decibels(*magnitude);
            let scaled = (255.0 / range) * (db - self.options.min_decibels);
            *slot = scaled.floor().clamp(0.0, 255.0) as u8;
        }
    }

    fn analyse(&mut self) {
        let n = self.history.len();
        for i in 0..n {
            let sample = self.history[(self.write_pos + i) % n];
            self.scratch[i] = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.scratch);

        let tau = self.options.smoothing_time_constant.clamp(0.0, 1.0);
        let norm = 1.0 / n as f32;
        for (bin, previous) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[bin].norm() * norm;
            let next = tau * *previous + (1.0 - tau) * magnitude;
            *previous = if next.is_finite() { next } else { 0.0 };
        }
    }
}

fn blackman_window(n: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

fn to_decibels(magnitude: f32) -> f32 {
    if magnitude <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * magnitude.log10()
    }
}
