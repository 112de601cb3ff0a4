use anyhow::bail;
use cadence_core::{AudioElement, ElementSource, PlaybackElement, StreamSettings};
use cadence_graph::GraphRegistry;
use cadence_stream::{
    BufferedSink, IngestionEngine, PlatformCapabilities, SessionOutcome, StreamController,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub async fn run(source: &str, settings: StreamSettings, out: Option<&Path>) -> anyhow::Result<()> {
    let fetcher = super::fetcher_for(source, settings.request_timeout()).await?;
    let mime = settings.mime_type.clone();
    let capabilities = PlatformCapabilities::new([mime.as_str()]);
    let sink = Arc::new(BufferedSink::new([mime.as_str()]));

    let element = Arc::new(AudioElement::new());
    let registry = GraphRegistry::default();
    let graph = registry.attach(element.as_ref())?;

    let engine = Arc::new(IngestionEngine::new(fetcher, capabilities, settings));
    let controller = StreamController::new(engine, element.clone()).with_graph(graph);

    info!(source = %source, mime = %mime, "Streaming");
    let report = controller.play(source, sink.clone()).finish().await?;

    match report.outcome {
        SessionOutcome::Ended { bytes, appends } => {
            println!("ended: {} bytes in {} appends", bytes, appends);
            if let Some(out) = out {
                tokio::fs::write(out, sink.buffered()).await?;
                println!("wrote {}", out.display());
            }
        }
        SessionOutcome::Fallback(reason) => {
            let url = match element.source() {
                ElementSource::Url(url) => url,
                other => format!("{:?}", other),
            };
            println!("fallback to direct playback of {}: {}", url, reason);
        }
        SessionOutcome::Errored { error, retryable } => {
            bail!("stream failed (retryable: {}): {}", retryable, error);
        }
        SessionOutcome::Closed => {
            println!("session closed before the end of the resource");
        }
    }

    Ok(())
}
