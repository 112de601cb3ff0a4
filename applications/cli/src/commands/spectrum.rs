use anyhow::Context;
use bytes::Bytes;
use cadence_core::{AudioElement, EqualizerSettings, Theme};
use cadence_graph::{AnalyserOptions, GraphOptions, GraphRegistry};
use cadence_visual::{decode_first_channel, DisplayList, FrequencyVisualizer, VisualizerSignals};
use std::path::Path;
use tokio::sync::watch;
use tracing::info;

pub async fn run(
    path: &Path,
    settings: EqualizerSettings,
    viewport: Option<u32>,
    at: f64,
    theme: Theme,
    svg: Option<&Path>,
) -> anyhow::Result<()> {
    let data = Bytes::from(tokio::fs::read(path).await?);
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_string);
    let audio = tokio::task::spawn_blocking(move || decode_first_channel(data, extension.as_deref()))
        .await??;

    let registry = GraphRegistry::new(GraphOptions {
        sample_rate: audio.sample_rate,
        channels: 1,
        analyser: AnalyserOptions::from(&settings),
    });
    let element = AudioElement::new();

    let width = viewport.map_or(settings.default_width, |w| settings.responsive_width(w));
    let (_theme_tx, theme_rx) = watch::channel(theme);
    let (_width_tx, width_rx) = watch::channel(width);
    let visualizer = FrequencyVisualizer::mount_manual(
        &registry,
        &element,
        DisplayList::default(),
        VisualizerSignals {
            theme: theme_rx,
            width: width_rx,
        },
        settings.clone(),
    )?;
    let graph = visualizer.graph().clone();

    // One render quantum per visual frame, as a real-time host would pace it
    let block = (audio.sample_rate / settings.frame_rate.max(1)).max(1) as usize;
    let end = ((at.max(0.0) * f64::from(audio.sample_rate)) as usize).min(audio.samples.len());
    let mut output = vec![0.0f32; block];
    let mut frames = 0u32;
    for chunk in audio.samples[..end].chunks(block) {
        graph.render(chunk, &mut output[..chunk.len()]);
        visualizer.draw_frame();
        frames += 1;
    }

    let bins = graph.frequency_snapshot();
    let peak = bins
        .iter()
        .enumerate()
        .max_by_key(|&(_, magnitude)| *magnitude)
        .map(|(i, &magnitude)| (i, magnitude))
        .context("analyser has no bins")?;
    let bin_hz = f64::from(audio.sample_rate) / settings.fft_size as f64;

    info!(frames, at = graph.context().current_time(), "Spectrum rendered");
    visualizer.with_canvas(|canvas| {
        println!(
            "{} bars at {}px, peak bin {} (~{:.0} Hz) = {}",
            canvas.rects().count(),
            width,
            peak.0,
            peak.0 as f64 * bin_hz,
            peak.1
        );
    });

    if let Some(svg) = svg {
        let document = visualizer.with_canvas(DisplayList::to_svg);
        tokio::fs::write(svg, document).await?;
        println!("wrote {}", svg.display());
    }

    Ok(())
}
