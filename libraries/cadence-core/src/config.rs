/// Pipeline configuration
use crate::error::{MediaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub stream: StreamSettings,

    #[serde(default)]
    pub equalizer: EqualizerSettings,

    #[serde(default)]
    pub waveform: WaveformSettings,
}

/// Chunked ingestion settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamSettings {
    /// Bytes requested per ranged read
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// MIME type negotiated with the sink
    #[serde(default = "default_mime_type")]
    pub mime_type: String,

    /// Gain ramp to silence before an append
    #[serde(default = "default_fade_out_ms")]
    pub fade_out_ms: u64,

    /// Gain ramp back to unity after an append
    #[serde(default = "default_fade_in_ms")]
    pub fade_in_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Real-time frequency visualizer settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EqualizerSettings {
    #[serde(default = "default_bar_width")]
    pub bar_width: u32,

    #[serde(default = "default_gap")]
    pub gap: u32,

    /// Width used until the real layout width is known
    #[serde(default = "default_equalizer_width")]
    pub default_width: u32,

    #[serde(default = "default_wide_width")]
    pub wide_width: u32,

    /// Viewport width at which `wide_width` applies
    #[serde(default = "default_wide_breakpoint")]
    pub wide_breakpoint: u32,

    #[serde(default = "default_equalizer_height")]
    pub height: u32,

    #[serde(default = "default_fft_size")]
    pub fft_size: usize,

    #[serde(default = "default_smoothing")]
    pub smoothing: f32,

    #[serde(default = "default_min_decibels")]
    pub min_decibels: f32,

    #[serde(default = "default_max_decibels")]
    pub max_decibels: f32,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

/// Offline waveform settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WaveformSettings {
    #[serde(default = "default_bar_width")]
    pub bar_width: u32,

    #[serde(default = "default_gap")]
    pub gap: u32,

    #[serde(default = "default_waveform_height")]
    pub height: u32,

    #[serde(default = "default_amplitude")]
    pub amplitude: f32,

    #[serde(default = "default_scale_factor")]
    pub scale_factor: f32,

    /// Width in pixels of the played/unplayed blend band
    #[serde(default = "default_transition_width")]
    pub transition_width: f32,

    /// Decoded tracks kept in memory
    #[serde(default = "default_cache_entries")]
    pub cache_entries: usize,
}

impl PipelineConfig {
    /// Load configuration from `cadence.toml` (if present) and environment
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("cadence.toml"))
    }

    /// Load configuration from a specific file (if present) and environment
    ///
    /// Environment variables are prefixed with `CADENCE_` and use `__` between
    /// section and key, e.g. `CADENCE_STREAM__CHUNK_SIZE=524288`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut settings = config::Config::builder();

        if path.exists() {
            settings = settings.add_source(config::File::from(path.to_path_buf()));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("CADENCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: PipelineConfig = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.stream.chunk_size == 0 {
            return Err(MediaError::Config(
                "stream.chunk_size must be greater than zero".to_string(),
            ));
        }

        if self.stream.mime_type.trim().is_empty() {
            return Err(MediaError::Config(
                "stream.mime_type must not be empty".to_string(),
            ));
        }

        let fft = self.equalizer.fft_size;
        if !(32..=32768).contains(&fft) || !fft.is_power_of_two() {
            return Err(MediaError::Config(format!(
                "equalizer.fft_size must be a power of two in 32..=32768, got {}",
                fft
            )));
        }

        if !(0.0..=1.0).contains(&self.equalizer.smoothing) {
            return Err(MediaError::Config(
                "equalizer.smoothing must be within [0, 1]".to_string(),
            ));
        }

        if self.equalizer.min_decibels >= self.equalizer.max_decibels {
            return Err(MediaError::Config(
                "equalizer.min_decibels must be below max_decibels".to_string(),
            ));
        }

        if self.equalizer.frame_rate == 0 {
            return Err(MediaError::Config(
                "equalizer.frame_rate must be greater than zero".to_string(),
            ));
        }

        if self.equalizer.bar_width == 0 || self.waveform.bar_width == 0 {
            return Err(MediaError::Config(
                "bar_width must be greater than zero".to_string(),
            ));
        }

        if self.waveform.transition_width < 0.0 {
            return Err(MediaError::Config(
                "waveform.transition_width must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}

impl StreamSettings {
    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }

    pub fn fade_in(&self) -> Duration {
        Duration::from_millis(self.fade_in_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl EqualizerSettings {
    /// Canvas width for a measured viewport width
    pub fn responsive_width(&self, viewport_width: u32) -> u32 {
        if viewport_width >= self.wide_breakpoint {
            self.wide_width
        } else {
            self.default_width
        }
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate.max(1)))
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            mime_type: default_mime_type(),
            fade_out_ms: default_fade_out_ms(),
            fade_in_ms: default_fade_in_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for EqualizerSettings {
    fn default() -> Self {
        Self {
            bar_width: default_bar_width(),
            gap: default_gap(),
            default_width: default_equalizer_width(),
            wide_width: default_wide_width(),
            wide_breakpoint: default_wide_breakpoint(),
            height: default_equalizer_height(),
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            min_decibels: default_min_decibels(),
            max_decibels: default_max_decibels(),
            frame_rate: default_frame_rate(),
        }
    }
}

impl Default for WaveformSettings {
    fn default() -> Self {
        Self {
            bar_width: default_bar_width(),
            gap: default_gap(),
            height: default_waveform_height(),
            amplitude: default_amplitude(),
            scale_factor: default_scale_factor(),
            transition_width: default_transition_width(),
            cache_entries: default_cache_entries(),
        }
    }
}

// Default values
fn default_chunk_size() -> u64 {
    1024 * 1024
}

fn default_mime_type() -> String {
    "audio/webm; codecs=\"opus\"".to_string()
}

fn default_fade_out_ms() -> u64 {
    10
}

fn default_fade_in_ms() -> u64 {
    20
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_bar_width() -> u32 {
    2
}

fn default_gap() -> u32 {
    1
}

fn default_equalizer_width() -> u32 {
    203
}

fn default_wide_width() -> u32 {
    400
}

fn default_wide_breakpoint() -> u32 {
    767
}

fn default_equalizer_height() -> u32 {
    110
}

fn default_fft_size() -> usize {
    2048
}

fn default_smoothing() -> f32 {
    0.8
}

fn default_min_decibels() -> f32 {
    -100.0
}

fn default_max_decibels() -> f32 {
    -30.0
}

fn default_frame_rate() -> u32 {
    60
}

fn default_waveform_height() -> u32 {
    50
}

fn default_amplitude() -> f32 {
    1.0
}

fn default_scale_factor() -> f32 {
    6.0
}

fn default_transition_width() -> f32 {
    5.0
}

fn default_cache_entries() -> usize {
    20
}
