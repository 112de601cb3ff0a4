//! Byte-range reads of the track resource

use async_trait::async_trait;
use bytes::Bytes;
use cadence_core::{MediaError, Result};
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Full bodies kept for servers that ignore `Range`
const FULL_BODY_ENTRIES: NonZeroUsize = match NonZeroUsize::new(4) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// Half-open byte window `[start, start + len)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub len: u64,
}

impl ByteRange {
    pub fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    /// Inclusive last byte offset, as used by HTTP `Range`
    pub fn end_inclusive(&self) -> u64 {
        (self.start + self.len).saturating_sub(1)
    }

    /// `Range` header value for this window
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end_inclusive())
    }
}

/// Source of track bytes
///
/// Implementations must return an empty body once `range.start` is at or past
/// the end of the resource, and a short body for the final partial window.
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Read one window of the resource
    async fn fetch_range(&self, url: &str, range: ByteRange) -> Result<Bytes>;

    /// Read the whole resource
    async fn fetch_all(&self, url: &str) -> Result<Bytes>;
}

/// `RangeFetcher` over HTTP using `Range` requests
///
/// A server that ignores `Range` answers 200 with the whole resource. That
/// body is kept and later windows of the same URL are sliced from it, so the
/// resource is downloaded once rather than once per chunk. The body is
/// dropped when the final window has been served.
#[derive(Debug, Clone)]
pub struct HttpRangeFetcher {
    client: Client,
    full_bodies: Arc<Mutex<LruCache<String, Bytes>>>,
}

impl HttpRangeFetcher {
    /// Build a fetcher with its own client and per-request timeout
    ///
    /// # Errors
    /// `MediaError::Config` if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediaError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self::with_client(client))
    }

    /// Reuse an existing client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            full_bodies: Arc::new(Mutex::new(LruCache::new(FULL_BODY_ENTRIES))),
        }
    }

    /// Slice `range` out of a kept full body, forgetting it once exhausted
    fn cached_window(&self, url: &str, range: ByteRange) -> Option<Bytes> {
        let mut bodies = self.bodies();
        let body = bodies.get(url)?.clone();
        let (window, exhausted) = slice_window(&body, range);
        if exhausted {
            bodies.pop(url);
        }
        Some(window)
    }

    fn bodies(&self) -> MutexGuard<'_, LruCache<String, Bytes>> {
        self.full_bodies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RangeFetcher for HttpRangeFetcher {
    async fn fetch_range(&self, url: &str, range: ByteRange) -> Result<Bytes> {
        if range.len == 0 {
            return Ok(Bytes::new());
        }

        if let Some(window) = self.cached_window(url, range) {
            debug!(url = %url, range = %range.header_value(), "Serving range from full body");
            return Ok(window);
        }

        debug!(url = %url, range = %range.header_value(), "Fetching byte range");

        let response = self
            .client
            .get(url)
            .header(RANGE, range.header_value())
            .send()
            .await
            .map_err(|e| MediaError::network(url, e))?;

        let status = response.status();

        // Start offset past the end of the resource
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            debug!(url = %url, start = range.start, "Range past end of resource");
            return Ok(Bytes::new());
        }

        if !status.is_success() {
            return Err(MediaError::network(
                url,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| MediaError::network(url, e))?;

        if status == StatusCode::PARTIAL_CONTENT {
            return Ok(body.slice(..body.len().min(usize_len(range.len))));
        }

        // Server ignored the Range header and sent the full resource
        let (window, exhausted) = slice_window(&body, range);
        if !exhausted {
            warn!(url = %url, bytes = body.len(), "Server ignored Range; keeping full body");
            self.bodies().put(url.to_string(), body);
        }
        Ok(window)
    }

    async fn fetch_all(&self, url: &str) -> Result<Bytes> {
        debug!(url = %url, "Fetching full resource");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MediaError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::network(
                url,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        response
            .bytes()
            .await
            .map_err(|e| MediaError::network(url, e))
    }
}

/// In-memory resources keyed by URL
///
/// Serves local files and pre-fetched bodies through the same interface as
/// `HttpRangeFetcher`.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    resources: Mutex<HashMap<String, Bytes>>,
    reads: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `body` under `url`, replacing any previous body
    pub fn insert(&self, url: impl Into<String>, body: impl Into<Bytes>) {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), body.into());
    }

    /// Number of reads served so far, ranged or full
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    fn body(&self, url: &str) -> Result<Bytes> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
            .ok_or_else(|| MediaError::network(url, "HTTP 404"))
    }
}

#[async_trait]
impl RangeFetcher for MemoryFetcher {
    async fn fetch_range(&self, url: &str, range: ByteRange) -> Result<Bytes> {
        let body = self.body(url)?;
        let start = usize_len(range.start).min(body.len());
        let end = usize_len(range.start.saturating_add(range.len)).min(body.len());
        Ok(body.slice(start..end))
    }

    async fn fetch_all(&self, url: &str) -> Result<Bytes> {
        self.body(url)
    }
}

/// Window of `body` covered by `range`, and whether it reaches the end
fn slice_window(body: &Bytes, range: ByteRange) -> (Bytes, bool) {
    let start = usize_len(range.start).min(body.len());
    let end = usize_len(range.start.saturating_add(range.len)).min(body.len());
    (body.slice(start..end), end >= body.len())
}

fn usize_len(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
