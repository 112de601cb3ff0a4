//! Real-time frequency visualizer
//!
//! Draws the shared graph's analyser spectrum as vertical bars once per
//! frame. Any number of visualizers can mount against the same element; they
//! all read the one analyser the registry attached.

use crate::canvas::{Canvas, Fill, Rgba};
use crate::frame::FrameLoop;
use crate::layout::{bar_x, equalizer_bar_count};
use cadence_core::{EqualizerSettings, PlaybackElement, Result, Theme};
use cadence_graph::{AudioGraphHandle, GraphRegistry};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

const DARK_BAR: Rgba = Rgba::rgb(0xEC, 0xEC, 0xEC);
const LIGHT_BAR: Rgba = Rgba::rgb(0xA9, 0xA9, 0xA9);

/// Bar color for a theme
pub fn bar_color(theme: Theme) -> Rgba {
    if theme.is_dark() {
        DARK_BAR
    } else {
        LIGHT_BAR
    }
}

/// Environment signals a visualizer follows while mounted
#[derive(Debug, Clone)]
pub struct VisualizerSignals {
    pub theme: watch::Receiver<Theme>,
    /// Measured layout width in pixels
    pub width: watch::Receiver<u32>,
}

struct Surface<C> {
    canvas: C,
    mounted: bool,
    bins: Vec<u8>,
    signals: VisualizerSignals,
    settings: EqualizerSettings,
}

/// A mounted frequency visualizer
pub struct FrequencyVisualizer<C: Canvas + 'static> {
    graph: Arc<AudioGraphHandle>,
    surface: Arc<Mutex<Surface<C>>>,
    frame_loop: Option<FrameLoop>,
}

impl<C: Canvas + 'static> FrequencyVisualizer<C> {
    /// Attach to `element`'s graph and start drawing at the configured rate
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(
        registry: &GraphRegistry,
        element: &dyn PlaybackElement,
        canvas: C,
        signals: VisualizerSignals,
        settings: EqualizerSettings,
    ) -> Result<Self> {
        let period = settings.frame_period();
        let mut visualizer = Self::mount_manual(registry, element, canvas, signals, settings)?;

        let graph = Arc::clone(&visualizer.graph);
        let surface = Arc::clone(&visualizer.surface);
        visualizer.frame_loop = Some(FrameLoop::start(period, move || {
            draw(&graph, &mut lock(&surface))
        }));

        Ok(visualizer)
    }

    /// Attach without a frame loop; frames are drawn by calling `draw_frame`
    pub fn mount_manual(
        registry: &GraphRegistry,
        element: &dyn PlaybackElement,
        mut canvas: C,
        signals: VisualizerSignals,
        settings: EqualizerSettings,
    ) -> Result<Self> {
        let graph = registry.attach(element)?;

        let width = *signals.width.borrow();
        canvas.resize(width, settings.height);

        debug!(element = %graph.element(), width, "Frequency visualizer mounted");

        Ok(Self {
            graph,
            surface: Arc::new(Mutex::new(Surface {
                canvas,
                mounted: true,
                bins: Vec::new(),
                signals,
                settings,
            })),
            frame_loop: None,
        })
    }

    /// Draw one frame now; `false` once unmounted
    pub fn draw_frame(&self) -> bool {
        draw(&self.graph, &mut lock(&self.surface))
    }

    /// Stop drawing
    ///
    /// No draw call reaches the canvas after this returns. The shared graph
    /// stays attached for the element's other consumers.
    pub fn unmount(&mut self) {
        {
            let mut surface = lock(&self.surface);
            if !surface.mounted {
                return;
            }
            surface.mounted = false;
        }
        if let Some(frame_loop) = self.frame_loop.take() {
            frame_loop.cancel();
        }
        debug!(element = %self.graph.element(), "Frequency visualizer unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        lock(&self.surface).mounted
    }

    pub fn graph(&self) -> &Arc<AudioGraphHandle> {
        &self.graph
    }

    /// Inspect the canvas
    pub fn with_canvas<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(&lock(&self.surface).canvas)
    }
}

impl<C: Canvas + 'static> Drop for FrequencyVisualizer<C> {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn lock<C>(surface: &Mutex<Surface<C>>) -> MutexGuard<'_, Surface<C>> {
    surface.lock().unwrap_or_else(PoisonError::into_inner)
}

fn draw<C: Canvas>(graph: &AudioGraphHandle, surface: &mut Surface<C>) -> bool {
    if !surface.mounted {
        return false;
    }

    let settings = &surface.settings;
    let width = *surface.signals.width.borrow();
    let height = settings.height;
    if surface.canvas.size() != (width, height) {
        surface.canvas.resize(width, height);
    }

    let bin_count = graph.frequency_bin_count();
    surface.bins.resize(bin_count, 0);
    graph.byte_frequency_data(&mut surface.bins);

    let color = bar_color(*surface.signals.theme.borrow());
    let bars = equalizer_bar_count(width, settings.bar_width, settings.gap, bin_count);
    let canvas_height = f64::from(height);

    surface.canvas.clear();
    for (i, &magnitude) in surface.bins.iter().take(bars).enumerate() {
        let bar_height = f64::from(magnitude) / 255.0 * canvas_height;
        surface.canvas.fill_rect(
            bar_x(i, settings.bar_width, settings.gap),
            canvas_height - bar_height,
            f64::from(settings.bar_width),
            bar_height,
            Fill::Solid(color),
        );
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::DisplayList;
    use cadence_core::AudioElement;

    fn signals(theme: Theme, width: u32) -> (watch::Sender<Theme>, watch::Sender<u32>, VisualizerSignals) {
        let (theme_tx, theme) = watch::channel(theme);
        let (width_tx, width) = watch::channel(width);
        (theme_tx, width_tx, VisualizerSignals { theme, width })
    }

    #[test]
    fn draws_one_bar_per_pitch() {
        let registry = GraphRegistry::default();
        let element = AudioElement::new();
        let (_t, _w, signals) = signals(Theme::Light, 203);

        let visualizer = FrequencyVisualizer::mount_manual(
            &registry,
            &element,
            DisplayList::default(),
            signals,
            EqualizerSettings::default(),
        )
        .unwrap();

        assert!(visualizer.draw_frame());
        visualizer.with_canvas(|canvas| {
            assert_eq!(canvas.size(), (203, 110));
            assert_eq!(canvas.rects().count(), 67);
            let (x, _, w, _, fill) = canvas.rects().nth(1).unwrap();
            assert_eq!(x, 3.0);
            assert_eq!(w, 2.0);
            assert_eq!(fill, Fill::Solid(LIGHT_BAR));
        });
    }

    #[test]
    fn theme_and_width_are_read_every_frame() {
        let registry = GraphRegistry::default();
        let element = AudioElement::new();
        let (theme_tx, width_tx, signals) = signals(Theme::Light, 203);

        let visualizer = FrequencyVisualizer::mount_manual(
            &registry,
            &element,
            DisplayList::default(),
            signals,
            EqualizerSettings::default(),
        )
        .unwrap();
        visualizer.draw_frame();

        theme_tx.send_replace(Theme::Dark);
        width_tx.send_replace(400);
        visualizer.draw_frame();

        visualizer.with_canvas(|canvas| {
            assert_eq!(canvas.size(), (400, 110));
            assert_eq!(canvas.rects().count(), 133);
            assert!(canvas
                .rects()
                .all(|(_, _, _, _, fill)| fill == Fill::Solid(DARK_BAR)));
        });
    }

    #[test]
    fn unmounted_visualizer_does_not_draw() {
        let registry = GraphRegistry::default();
        let element = AudioElement::new();
        let (_t, _w, signals) = signals(Theme::Dark, 203);

        let mut visualizer = FrequencyVisualizer::mount_manual(
            &registry,
            &element,
            DisplayList::default(),
            signals,
            EqualizerSettings::default(),
        )
        .unwrap();
        visualizer.draw_frame();
        let calls = visualizer.with_canvas(DisplayList::draw_calls);

        visualizer.unmount();

        assert!(!visualizer.draw_frame());
        assert_eq!(visualizer.with_canvas(DisplayList::draw_calls), calls);
        assert!(registry.get(element.id()).is_some());
    }
}
