use anyhow::bail;
use cadence_core::{AudioElement, ProgressCell, Theme, WaveformSettings};
use cadence_visual::{DisplayList, LoadOutcome, WaveformRenderer};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How the rendered frame should look
#[derive(Debug, Clone, Copy)]
pub struct View {
    pub width: u32,
    pub theme: Theme,
    pub progress: f64,
}

pub async fn run(
    source: &str,
    timeout: Duration,
    settings: WaveformSettings,
    view: View,
    svg: Option<&Path>,
) -> anyhow::Result<()> {
    let fetcher = super::fetcher_for(source, timeout).await?;
    let element = Arc::new(AudioElement::new());
    let progress = Arc::new(ProgressCell::default());
    let renderer = WaveformRenderer::new(fetcher, element, progress.clone(), settings);

    info!(source = %source, width = view.width, "Rendering waveform");
    let data = match renderer.load(source, view.width).await? {
        LoadOutcome::Ready(data) => data,
        LoadOutcome::Stale => bail!("waveform load was superseded"),
    };

    let duration = data.duration_secs();
    progress.update(view.progress.clamp(0.0, 1.0) * duration, Some(duration));

    let mut canvas = DisplayList::default();
    renderer.paint(&mut canvas, view.theme);

    println!(
        "{} bars over {:.2}s, peak {:.3}",
        data.num_bars(),
        duration,
        data.bars().iter().copied().fold(0.0f32, f32::max)
    );
    println!("{}", sparkline(data.bars()));

    if let Some(svg) = svg {
        tokio::fs::write(svg, canvas.to_svg()).await?;
        println!("wrote {}", svg.display());
    }

    Ok(())
}

/// One block character per bar, scaled to the loudest bar
fn sparkline(bars: &[f32]) -> String {
    const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

    let peak = bars.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return LEVELS[0].to_string().repeat(bars.len());
    }
    bars.iter()
        .map(|&bar| {
            let level = ((bar / peak) * (LEVELS.len() - 1) as f32).round() as usize;
            LEVELS[level.min(LEVELS.len() - 1)]
        })
        .collect()
}
