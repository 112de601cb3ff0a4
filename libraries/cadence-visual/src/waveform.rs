//! Offline waveform renderer
//!
//! Loading a track: fetch the whole resource, decode channel 0 on the
//! blocking pool, reduce it to one RMS value per bar on a worker thread.
//! Painting is then a pure function of the bars, the playback ratio and the
//! pointer state, cheap enough to redo on every progress update.
//!
//! Loads are numbered. When the track or width changes while a load is in
//! flight, the older load's result is discarded on arrival.

use crate::cache::DecodedCache;
use crate::canvas::{Canvas, Fill, Rgba};
use crate::decode::{decode_first_channel, DecodedAudio};
use crate::layout::{bar_x, waveform_bar_count};
use crate::worker::{spawn_reduction, ReductionRequest};
use cadence_core::{
    format_time, MediaError, PlaybackElement, ProgressStore, Result, Theme, WaveformSettings,
};
use cadence_stream::RangeFetcher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Reduced track, one RMS value per bar
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformData {
    bars: Vec<f32>,
    width: u32,
    duration_secs: f64,
}

impl WaveformData {
    pub fn new(bars: Vec<f32>, width: u32, duration_secs: f64) -> Self {
        Self {
            bars,
            width,
            duration_secs,
        }
    }

    /// RMS values in `[0, 1]`
    pub fn bars(&self) -> &[f32] {
        &self.bars
    }

    pub fn num_bars(&self) -> usize {
        self.bars.len()
    }

    /// Canvas width the bars were computed for
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Decoded length of the track
    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}

/// Colors for one theme
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformPalette {
    pub played: Fill,
    pub unplayed: Fill,
    /// Bars between the play head and a dragged pointer
    pub highlight: Rgba,
}

impl WaveformPalette {
    pub fn for_theme(theme: Theme) -> Self {
        let unplayed = if theme.is_dark() {
            Fill::VerticalGradient {
                top: Rgba::rgb(150, 150, 150),
                bottom: Rgba::rgb(100, 100, 100),
            }
        } else {
            Fill::VerticalGradient {
                top: Rgba::rgb(190, 190, 190),
                bottom: Rgba::rgb(180, 180, 180),
            }
        };

        Self {
            played: Fill::VerticalGradient {
                top: Rgba::rgb(0, 120, 255),
                bottom: Rgba::rgb(0, 60, 255),
            },
            unplayed,
            highlight: Rgba::rgba(0, 120, 255, 0.5),
        }
    }
}

/// How one bar is colored
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BarShade {
    Played,
    /// Unplayed with the played fill layered on top at `alpha`
    Blend { alpha: f32 },
    Unplayed,
    Highlight,
}

/// Shade of the bar whose left edge is at `x`
///
/// `play_x` is the play head in pixels, `band` the width of the blend region
/// left of it. While dragging, `drag_x` is the pointer position; the bars
/// between the play head and the pointer are highlighted.
pub fn shade_for_bar(x: f64, play_x: f64, band: f64, drag_x: Option<f64>) -> BarShade {
    let progress_shade = || {
        if x < play_x - band {
            BarShade::Played
        } else if x < play_x {
            let alpha = if band > 0.0 {
                ((play_x - x) / band).clamp(0.0, 1.0) as f32
            } else {
                1.0
            };
            BarShade::Blend { alpha }
        } else {
            BarShade::Unplayed
        }
    };

    match drag_x {
        Some(drag) if drag > play_x => {
            if x >= play_x && x < drag {
                BarShade::Highlight
            } else {
                progress_shade()
            }
        }
        Some(drag) if drag < play_x => {
            if x < drag {
                progress_shade()
            } else if x < play_x {
                BarShade::Highlight
            } else {
                BarShade::Unplayed
            }
        }
        _ => progress_shade(),
    }
}

/// Canvas geometry derived from settings and a width
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaintGeometry {
    pub width: u32,
    pub height: u32,
    pub bar_width: u32,
    pub gap: u32,
    pub amplitude: f64,
    pub scale_factor: f64,
    pub transition_width: f64,
}

impl PaintGeometry {
    pub fn new(settings: &WaveformSettings, width: u32) -> Self {
        Self {
            width,
            height: settings.height,
            bar_width: settings.bar_width,
            gap: settings.gap,
            amplitude: f64::from(settings.amplitude),
            scale_factor: f64::from(settings.scale_factor),
            transition_width: f64::from(settings.transition_width),
        }
    }

    pub fn num_bars(&self) -> usize {
        waveform_bar_count(self.width, self.bar_width, self.gap)
    }

    /// Play head position for a progress ratio
    pub fn play_x(&self, ratio: f64) -> f64 {
        ratio.clamp(0.0, 1.0) * f64::from(self.width)
    }

    /// Shade of bar `index` at progress `ratio`
    pub fn shade(&self, index: usize, ratio: f64, drag_x: Option<f64>) -> BarShade {
        shade_for_bar(
            bar_x(index, self.bar_width, self.gap),
            self.play_x(ratio),
            self.transition_width,
            drag_x,
        )
    }

    /// Bar height in pixels for an RMS value, at most the canvas height
    pub fn bar_height(&self, rms: f32) -> f64 {
        let height = f64::from(self.height);
        (f64::from(rms) * self.amplitude * height * self.scale_factor).clamp(0.0, height)
    }
}

/// Paint `data` onto `canvas`
pub fn paint<C: Canvas + ?Sized>(
    canvas: &mut C,
    data: &WaveformData,
    geometry: &PaintGeometry,
    ratio: f64,
    theme: Theme,
    drag_x: Option<f64>,
) {
    if canvas.size() != (geometry.width, geometry.height) {
        canvas.resize(geometry.width, geometry.height);
    }
    canvas.clear();

    let palette = WaveformPalette::for_theme(theme);
    let canvas_height = f64::from(geometry.height);
    let bar_width = f64::from(geometry.bar_width);

    for (i, &rms) in data.bars().iter().enumerate() {
        let height = geometry.bar_height(rms);
        let y = (canvas_height - height) / 2.0;
        let x = bar_x(i, geometry.bar_width, geometry.gap);

        match geometry.shade(i, ratio, drag_x) {
            BarShade::Played => canvas.fill_rect(x, y, bar_width, height, palette.played),
            BarShade::Unplayed => canvas.fill_rect(x, y, bar_width, height, palette.unplayed),
            BarShade::Blend { alpha } => {
                canvas.fill_rect(x, y, bar_width, height, palette.unplayed);
                canvas.fill_rect(x, y, bar_width, height, palette.played.with_alpha(alpha));
            }
            BarShade::Highlight => {
                canvas.fill_rect(x, y, bar_width, height, Fill::Solid(palette.highlight));
            }
        }
    }
}

/// Time under the pointer
#[derive(Debug, Clone, PartialEq)]
pub struct HoverInfo {
    /// Pointer x clamped to the canvas
    pub x: f64,
    pub time_secs: f64,
    /// `m:ss`
    pub label: String,
}

/// Result of a `WaveformRenderer::load`
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The bars are current and ready to paint
    Ready(Arc<WaveformData>),
    /// A newer load started before this one finished; result dropped
    Stale,
}

#[derive(Debug, Default)]
struct RendererState {
    url: Option<String>,
    width: u32,
    data: Option<Arc<WaveformData>>,
    drag_x: Option<f64>,
}

/// Waveform for the track playing on one element
pub struct WaveformRenderer {
    fetcher: Arc<dyn RangeFetcher>,
    element: Arc<dyn PlaybackElement>,
    progress: Arc<dyn ProgressStore>,
    cache: Arc<DecodedCache>,
    settings: WaveformSettings,
    generation: AtomicU64,
    state: Mutex<RendererState>,
}

impl WaveformRenderer {
    pub fn new(
        fetcher: Arc<dyn RangeFetcher>,
        element: Arc<dyn PlaybackElement>,
        progress: Arc<dyn ProgressStore>,
        settings: WaveformSettings,
    ) -> Self {
        let cache = Arc::new(DecodedCache::new(settings.cache_entries));
        Self::with_cache(fetcher, element, progress, settings, cache)
    }

    /// Share a decoded cache between renderers
    pub fn with_cache(
        fetcher: Arc<dyn RangeFetcher>,
        element: Arc<dyn PlaybackElement>,
        progress: Arc<dyn ProgressStore>,
        settings: WaveformSettings,
        cache: Arc<DecodedCache>,
    ) -> Self {
        Self {
            fetcher,
            element,
            progress,
            cache,
            settings,
            generation: AtomicU64::new(0),
            state: Mutex::new(RendererState::default()),
        }
    }

    /// Compute the waveform of `url` for a `width` canvas
    ///
    /// Starting a load invalidates every load still in flight. On failure the
    /// renderer holds no data and paints nothing.
    pub async fn load(&self, url: &str, width: u32) -> Result<LoadOutcome> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.lock();
            state.url = Some(url.to_string());
            state.width = width;
            state.data = None;
            state.drag_x = None;
        }

        match self.compute(url, width, generation).await {
            Ok(Some(data)) => {
                let mut state = self.lock();
                if !self.is_current(generation) {
                    return Ok(self.discard(url, generation));
                }
                state.data = Some(Arc::clone(&data));
                info!(url = %url, width, bars = data.num_bars(), "Waveform ready");
                Ok(LoadOutcome::Ready(data))
            }
            Ok(None) => Ok(self.discard(url, generation)),
            Err(_) if !self.is_current(generation) => Ok(self.discard(url, generation)),
            Err(error) => {
                warn!(url = %url, %error, "Waveform unavailable");
                Err(error)
            }
        }
    }

    async fn compute(
        &self,
        url: &str,
        width: u32,
        generation: u64,
    ) -> Result<Option<Arc<WaveformData>>> {
        let audio = match self.cache.get(url) {
            Some(audio) => audio,
            None => {
                let bytes = self.fetcher.fetch_all(url).await?;
                if !self.is_current(generation) {
                    return Ok(None);
                }

                let extension = extension_of(url);
                let audio = tokio::task::spawn_blocking(move || {
                    decode_first_channel(bytes, extension.as_deref())
                })
                .await
                .map_err(|e| MediaError::DecodeFailure(format!("decode task failed: {}", e)))??;

                self.cache.insert(url, audio.clone());
                audio
            }
        };

        if !self.is_current(generation) {
            return Ok(None);
        }

        let DecodedAudio {
            samples,
            sample_rate,
        } = audio;
        let duration_secs = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / f64::from(sample_rate)
        };

        let num_bars = waveform_bar_count(width, self.settings.bar_width, self.settings.gap);
        let bars = spawn_reduction(ReductionRequest { samples, num_bars }).await?;

        Ok(Some(Arc::new(WaveformData::new(
            bars,
            width,
            duration_secs,
        ))))
    }

    fn discard(&self, url: &str, generation: u64) -> LoadOutcome {
        debug!(
            url = %url,
            generation,
            current = self.generation.load(Ordering::SeqCst),
            "Discarding stale waveform result"
        );
        LoadOutcome::Stale
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Bars of the current track, once loaded
    pub fn data(&self) -> Option<Arc<WaveformData>> {
        self.lock().data.clone()
    }

    /// Track the current bars belong to
    pub fn url(&self) -> Option<String> {
        self.lock().url.clone()
    }

    pub fn geometry(&self) -> PaintGeometry {
        PaintGeometry::new(&self.settings, self.lock().width)
    }

    /// Paint the current state; `false` when there is nothing to paint
    pub fn paint<C: Canvas + ?Sized>(&self, canvas: &mut C, theme: Theme) -> bool {
        let (data, drag_x, width) = {
            let state = self.lock();
            match &state.data {
                Some(data) => (Arc::clone(data), state.drag_x, state.width),
                None => return false,
            }
        };

        let ratio = self.progress.progress().ratio();
        let geometry = PaintGeometry::new(&self.settings, width);
        paint(canvas, &data, &geometry, ratio, theme, drag_x);
        true
    }

    /// Seek time under pointer `x`; `None` while the duration is unknown
    pub fn hover(&self, x: f64) -> Option<HoverInfo> {
        let duration = self.progress.progress().known_duration()?;
        let width = f64::from(self.lock().width);
        if width <= 0.0 || !x.is_finite() {
            return None;
        }

        let x = x.clamp(0.0, width);
        let time_secs = x / width * duration;
        Some(HoverInfo {
            x,
            time_secs,
            label: format_time(time_secs),
        })
    }

    /// Start dragging at `x`
    pub fn pointer_down(&self, x: f64) -> Option<HoverInfo> {
        let hover = self.hover(x)?;
        self.lock().drag_x = Some(hover.x);
        Some(hover)
    }

    /// Follow the pointer while dragging
    pub fn pointer_move(&self, x: f64) -> Option<HoverInfo> {
        let hover = self.hover(x)?;
        let mut state = self.lock();
        if state.drag_x.is_some() {
            state.drag_x = Some(hover.x);
        }
        Some(hover)
    }

    /// Finish the drag and seek to the time under `x`
    ///
    /// The time is committed to both the element and the progress store.
    pub fn pointer_up(&self, x: f64) -> Option<f64> {
        let was_dragging = self.lock().drag_x.take().is_some();
        if !was_dragging {
            return None;
        }

        let hover = self.hover(x)?;
        self.element.seek(hover.time_secs);
        self.progress.commit_seek(hover.time_secs);
        debug!(time = hover.time_secs, label = %hover.label, "Seek committed from waveform");
        Some(hover.time_secs)
    }

    pub fn is_dragging(&self) -> bool {
        self.lock().drag_x.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, RendererState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// File extension hint from the last path segment, ignoring any query
fn extension_of(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}
