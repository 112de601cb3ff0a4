//! Bar layout shared by both renderers

/// Bars the frequency visualizer draws on a `width` canvas
///
/// Never more than the analyser provides bins for.
pub fn equalizer_bar_count(width: u32, bar_width: u32, gap: u32, bins: usize) -> usize {
    let pitch = (bar_width + gap).max(1);
    ((width / pitch) as usize).min(bins)
}

/// Bars the waveform renderer reduces a track to for a `width` canvas
///
/// The last bar does not need a trailing gap, hence `width + gap`.
pub fn waveform_bar_count(width: u32, bar_width: u32, gap: u32) -> usize {
    let pitch = (bar_width + gap).max(1);
    ((width + gap) / pitch) as usize
}

/// Left edge of bar `index`
pub fn bar_x(index: usize, bar_width: u32, gap: u32) -> f64 {
    index as f64 * f64::from(bar_width + gap)
}
