//! Ingestion loop behaviour against in-process sinks and fetchers

use async_trait::async_trait;
use bytes::Bytes;
use cadence_core::{
    AudioElement, ElementSource, MediaError, PlaybackElement, Result, StreamSettings,
};
use cadence_graph::{AudioGraphHandle, GraphOptions, GraphRegistry};
use cadence_stream::{
    BufferedSink, ByteRange, FallbackReason, IngestionEngine, MediaSink, MemoryFetcher,
    PlatformCapabilities, RangeFetcher, SessionBindings, SessionOutcome, SessionState,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

const OPUS: &str = "audio/webm; codecs=\"opus\"";
const URL: &str = "mem://track.webm";
const MIB: u64 = 1024 * 1024;

fn settings(chunk_size: u64) -> StreamSettings {
    StreamSettings {
        chunk_size,
        ..StreamSettings::default()
    }
}

fn resource(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn graph_for(element: &AudioElement) -> Arc<AudioGraphHandle> {
    let registry = GraphRegistry::new(GraphOptions {
        sample_rate: 1000,
        channels: 1,
        ..GraphOptions::default()
    });
    registry.attach(element).unwrap()
}

struct Harness {
    element: Arc<AudioElement>,
    sink: Arc<BufferedSink>,
    graph: Arc<AudioGraphHandle>,
    cancel: CancellationToken,
}

impl Harness {
    fn new(sink: BufferedSink) -> Self {
        let element = Arc::new(AudioElement::new());
        let graph = graph_for(&element);
        Self {
            element,
            sink: Arc::new(sink),
            graph,
            cancel: CancellationToken::new(),
        }
    }

    fn bindings(&self) -> SessionBindings {
        SessionBindings {
            element: self.element.clone(),
            sink: self.sink.clone(),
            graph: Some(Arc::clone(&self.graph)),
            cancel: self.cancel.clone(),
        }
    }
}

/// Serves from memory but fails every read from `fail_at` onwards
struct FailingFetcher {
    inner: MemoryFetcher,
    fail_at: u32,
    calls: AtomicU32,
}

#[async_trait]
impl RangeFetcher for FailingFetcher {
    async fn fetch_range(&self, url: &str, range: ByteRange) -> Result<Bytes> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_at {
            return Err(MediaError::network(url, "connection reset"));
        }
        self.inner.fetch_range(url, range).await
    }

    async fn fetch_all(&self, url: &str) -> Result<Bytes> {
        self.inner.fetch_all(url).await
    }
}

/// Blocks reads from `gate_at` onwards until released
struct GatedFetcher {
    inner: MemoryFetcher,
    gate_at: u32,
    calls: AtomicU32,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl RangeFetcher for GatedFetcher {
    async fn fetch_range(&self, url: &str, range: ByteRange) -> Result<Bytes> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.gate_at {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.fetch_range(url, range).await
    }

    async fn fetch_all(&self, url: &str) -> Result<Bytes> {
        self.inner.fetch_all(url).await
    }
}

#[tokio::test]
async fn ten_mebibytes_stream_in_ten_chunks() {
    let body = resource((10 * MIB) as usize);
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(URL, body.clone());

    let engine = IngestionEngine::new(
        fetcher.clone(),
        PlatformCapabilities::new([OPUS]),
        settings(MIB),
    );
    let h = Harness::new(BufferedSink::new([OPUS]));
    let mut session = engine.session(1, URL);

    let outcome = engine.run(&mut session, &h.bindings()).await;

    assert!(matches!(
        outcome,
        SessionOutcome::Ended { bytes, appends: 10 } if bytes == 10 * MIB
    ));
    assert_eq!(session.state(), SessionState::Ended);
    assert_eq!(session.appends(), 10);
    // The eleventh read comes back empty and ends the stream
    assert_eq!(session.reads(), 11);
    assert_eq!(fetcher.reads(), 11);
    assert_eq!(&h.sink.buffered()[..], &body[..]);
    assert!(!session.sink_open());
}

#[tokio::test]
async fn short_final_read_ends_without_extra_request() {
    let body = resource(2500);
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(URL, body.clone());

    let engine = IngestionEngine::new(
        fetcher.clone(),
        PlatformCapabilities::new([OPUS]),
        settings(1000),
    );
    let h = Harness::new(BufferedSink::new([OPUS]));
    let mut session = engine.session(1, URL);

    let outcome = engine.run(&mut session, &h.bindings()).await;

    assert!(matches!(
        outcome,
        SessionOutcome::Ended {
            bytes: 2500,
            appends: 3
        }
    ));
    assert_eq!(fetcher.reads(), 3);
    assert_eq!(&h.sink.buffered()[..], &body[..]);
}

#[tokio::test]
async fn first_append_starts_playback_once() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(URL, resource(4096));

    let engine = IngestionEngine::new(fetcher, PlatformCapabilities::new([OPUS]), settings(1024));
    let h = Harness::new(BufferedSink::new([OPUS]));
    let mut session = engine.session(9, URL);

    engine.run(&mut session, &h.bindings()).await;

    assert_eq!(h.element.play_requests(), 1);
    assert!(!h.element.is_paused());
    assert_eq!(h.element.source(), ElementSource::MediaStream { session: 9 });
}

#[tokio::test]
async fn gain_returns_to_unity_after_streaming() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(URL, resource(8192));

    let engine = IngestionEngine::new(fetcher, PlatformCapabilities::new([OPUS]), settings(1024));
    let h = Harness::new(BufferedSink::new([OPUS]));
    let mut session = engine.session(1, URL);

    engine.run(&mut session, &h.bindings()).await;

    let gain = h.graph.gain().gain();
    for step in 0..100 {
        let v = gain.value_at(f64::from(step) * 0.001);
        assert!((0.0..=1.0).contains(&v), "gain {} out of range", v);
    }
    assert_eq!(gain.value_at(1.0), 1.0);
}

#[tokio::test]
async fn unsupported_encoding_falls_back_before_any_append() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(URL, resource(4096));

    let engine = IngestionEngine::new(
        fetcher.clone(),
        PlatformCapabilities::new(["audio/mpeg"]),
        settings(1024),
    );
    let h = Harness::new(BufferedSink::new(["audio/mpeg"]));
    let mut session = engine.session(1, URL);

    let outcome = engine.run(&mut session, &h.bindings()).await;

    assert!(matches!(
        outcome,
        SessionOutcome::Fallback(FallbackReason::UnsupportedEncoding(_))
    ));
    assert_eq!(session.state(), SessionState::Fallback);
    assert_eq!(h.sink.append_count(), 0);
    assert_eq!(fetcher.reads(), 0);
    assert_eq!(h.element.source(), ElementSource::Url(URL.to_string()));
    assert_eq!(h.element.play_requests(), 1);
}

#[tokio::test]
async fn sink_refusing_the_type_falls_back() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(URL, resource(4096));

    // Platform claims support but the sink itself refuses the buffer
    let engine = IngestionEngine::new(
        fetcher.clone(),
        PlatformCapabilities::new([OPUS]),
        settings(1024),
    );
    let h = Harness::new(BufferedSink::new(["audio/mpeg"]));
    let mut session = engine.session(1, URL);

    let outcome = engine.run(&mut session, &h.bindings()).await;

    assert!(matches!(
        outcome,
        SessionOutcome::Fallback(FallbackReason::UnsupportedEncoding(_))
    ));
    assert_eq!(h.sink.append_count(), 0);
    assert_eq!(fetcher.reads(), 0);
    assert_eq!(h.element.source(), ElementSource::Url(URL.to_string()));
}

#[tokio::test]
async fn missing_incremental_buffering_plays_directly() {
    let fetcher = Arc::new(MemoryFetcher::new());
    let engine = IngestionEngine::new(
        fetcher,
        PlatformCapabilities::unavailable(),
        settings(1024),
    );
    let h = Harness::new(BufferedSink::new([OPUS]));
    let mut session = engine.session(1, URL);

    let outcome = engine.run(&mut session, &h.bindings()).await;

    assert!(matches!(
        outcome,
        SessionOutcome::Fallback(FallbackReason::IncrementalBufferingUnavailable)
    ));
    assert_eq!(h.element.source(), ElementSource::Url(URL.to_string()));
}

#[tokio::test]
async fn rejected_append_falls_back_mid_stream() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(URL, resource(4096));

    let engine = IngestionEngine::new(fetcher, PlatformCapabilities::new([OPUS]), settings(1024));
    let h = Harness::new(BufferedSink::new([OPUS]).with_quota(2500));
    let mut session = engine.session(1, URL);

    let outcome = engine.run(&mut session, &h.bindings()).await;

    assert!(matches!(
        outcome,
        SessionOutcome::Fallback(FallbackReason::AppendRejected(_))
    ));
    assert_eq!(h.sink.append_count(), 2);
    assert_eq!(session.bytes_appended(), 2048);
    assert_eq!(h.element.source(), ElementSource::Url(URL.to_string()));
    // Gain is restored even though the append failed
    assert_eq!(h.graph.gain().gain().value_at(10.0), 1.0);
}

#[tokio::test]
async fn network_failure_is_retryable_and_does_not_fall_back() {
    let inner = MemoryFetcher::new();
    inner.insert(URL, resource(8192));
    let fetcher = Arc::new(FailingFetcher {
        inner,
        fail_at: 2,
        calls: AtomicU32::new(0),
    });

    let engine = IngestionEngine::new(fetcher, PlatformCapabilities::new([OPUS]), settings(1024));
    let h = Harness::new(BufferedSink::new([OPUS]));
    let mut session = engine.session(4, URL);

    let outcome = engine.run(&mut session, &h.bindings()).await;

    match outcome {
        SessionOutcome::Errored { error, retryable } => {
            assert!(retryable);
            assert!(matches!(error, MediaError::NetworkReadFailure { .. }));
        }
        other => panic!("expected Errored, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Errored);
    assert_eq!(session.appends(), 2);
    assert_eq!(h.element.source(), ElementSource::MediaStream { session: 4 });
}

#[tokio::test]
async fn external_close_stops_the_loop_at_next_suspension() {
    let inner = MemoryFetcher::new();
    inner.insert(URL, resource(8192));
    let fetcher = Arc::new(GatedFetcher {
        inner,
        gate_at: 1,
        calls: AtomicU32::new(0),
        entered: Notify::new(),
        release: Notify::new(),
    });

    let engine = Arc::new(IngestionEngine::new(
        fetcher.clone(),
        PlatformCapabilities::new([OPUS]),
        settings(1024),
    ));
    let h = Harness::new(BufferedSink::new([OPUS]));
    let bindings = h.bindings();

    let task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut session = engine.session(1, URL);
            let outcome = engine.run(&mut session, &bindings).await;
            (session, outcome)
        })
    };

    // Second read is in flight; close the sink underneath it
    fetcher.entered.notified().await;
    h.sink.close();
    fetcher.release.notify_one();

    let (session, outcome) = task.await.unwrap();

    assert!(matches!(outcome, SessionOutcome::Closed));
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(h.sink.append_count(), 1);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    // The closed session never reassigns the element
    assert_eq!(h.element.source(), ElementSource::MediaStream { session: 1 });
}

#[tokio::test]
async fn cancellation_interrupts_a_pending_read() {
    let inner = MemoryFetcher::new();
    inner.insert(URL, resource(8192));
    let fetcher = Arc::new(GatedFetcher {
        inner,
        gate_at: 0,
        calls: AtomicU32::new(0),
        entered: Notify::new(),
        release: Notify::new(),
    });

    let engine = Arc::new(IngestionEngine::new(
        fetcher.clone(),
        PlatformCapabilities::new([OPUS]),
        settings(1024),
    ));
    let h = Harness::new(BufferedSink::new([OPUS]));
    let bindings = h.bindings();

    let task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut session = engine.session(1, URL);
            engine.run(&mut session, &bindings).await
        })
    };

    fetcher.entered.notified().await;
    h.cancel.cancel();

    // Gate is never released; cancellation alone must end the session
    let outcome = task.await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Closed));
    assert_eq!(h.sink.append_count(), 0);
    assert_eq!(h.element.play_requests(), 0);
}

#[tokio::test]
async fn sink_state_is_observable_during_run() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(URL, resource(100));

    let engine = IngestionEngine::new(fetcher, PlatformCapabilities::new([OPUS]), settings(1024));
    let h = Harness::new(BufferedSink::new([OPUS]));
    let mut session = engine.session(1, URL);
    let states = session.subscribe();

    engine.run(&mut session, &h.bindings()).await;

    assert_eq!(*states.borrow(), SessionState::Ended);
    assert!(!h.sink.is_open());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: every byte is appended exactly once, in order
    #[test]
    fn appended_bytes_equal_resource(len in 0usize..6000, chunk in 1u64..1500) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let body = resource(len);
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert(URL, body.clone());
        let engine = IngestionEngine::new(fetcher, PlatformCapabilities::new([OPUS]), settings(chunk));
        let h = Harness::new(BufferedSink::new([OPUS]));
        let mut session = engine.session(1, URL);

        let outcome = runtime.block_on(engine.run(&mut session, &h.bindings()));

        let expected_appends = (len as u64).div_ceil(chunk);
        prop_assert!(
            matches!(outcome, SessionOutcome::Ended { bytes, appends }
                if bytes == len as u64 && u64::from(appends) == expected_appends),
            "unexpected outcome {:?}", outcome
        );
        prop_assert_eq!(&h.sink.buffered()[..], &body[..]);
    }
}
