pub mod spectrum;
pub mod stream;
pub mod waveform;

use cadence_stream::{HttpRangeFetcher, MemoryFetcher, RangeFetcher};
use std::sync::Arc;
use std::time::Duration;

/// Fetcher able to serve `source`
///
/// Remote URLs go over HTTP range requests; a local path is read once and
/// served from memory under the same key.
pub async fn fetcher_for(source: &str, timeout: Duration) -> anyhow::Result<Arc<dyn RangeFetcher>> {
    if is_remote(source) {
        return Ok(Arc::new(HttpRangeFetcher::new(timeout)?));
    }

    let body = tokio::fs::read(source).await?;
    let fetcher = MemoryFetcher::new();
    fetcher.insert(source, body);
    Ok(Arc::new(fetcher))
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
