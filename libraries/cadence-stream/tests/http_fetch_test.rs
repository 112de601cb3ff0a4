//! `HttpRangeFetcher` against a mock server

use cadence_core::{AudioElement, MediaError, StreamSettings};
use cadence_stream::{
    BufferedSink, ByteRange, HttpRangeFetcher, IngestionEngine, PlatformCapabilities,
    RangeFetcher, SessionBindings, SessionOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OPUS: &str = "audio/webm; codecs=\"opus\"";

fn fetcher() -> HttpRangeFetcher {
    HttpRangeFetcher::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn partial_content_returns_requested_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/track.webm"))
        .and(header("range", "bytes=0-3"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(b"abcd".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/track.webm", server.uri());
    let body = fetcher()
        .fetch_range(&url, ByteRange::new(0, 4))
        .await
        .unwrap();

    assert_eq!(&body[..], b"abcd");
}

#[tokio::test]
async fn range_not_satisfiable_reads_as_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/track.webm"))
        .respond_with(ResponseTemplate::new(416))
        .mount(&server)
        .await;

    let url = format!("{}/track.webm", server.uri());
    let body = fetcher()
        .fetch_range(&url, ByteRange::new(4096, 1024))
        .await
        .unwrap();

    assert!(body.is_empty());
}

#[tokio::test]
async fn full_response_is_sliced_to_the_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/track.webm"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/track.webm", server.uri());
    let fetcher = fetcher();

    let middle = fetcher.fetch_range(&url, ByteRange::new(4, 4)).await.unwrap();
    let tail = fetcher.fetch_range(&url, ByteRange::new(8, 4)).await.unwrap();
    let past = fetcher.fetch_range(&url, ByteRange::new(20, 4)).await.unwrap();

    assert_eq!(&middle[..], b"4567");
    assert_eq!(&tail[..], b"89");
    assert!(past.is_empty());
}

#[tokio::test]
async fn server_ignoring_range_is_downloaded_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/track.webm"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    let url = format!("{}/track.webm", server.uri());
    let fetcher = fetcher();

    let mut streamed = Vec::new();
    for start in (0..12).step_by(4) {
        let window = fetcher.fetch_range(&url, ByteRange::new(start, 4)).await.unwrap();
        streamed.extend_from_slice(&window);
    }
    assert_eq!(streamed, b"0123456789");

    // The kept body was released with the final window; a replay fetches again
    let again = fetcher.fetch_range(&url, ByteRange::new(0, 4)).await.unwrap();
    assert_eq!(&again[..], b"0123");
}

#[tokio::test]
async fn server_error_is_retryable_network_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let url = format!("{}/track.webm", server.uri());
    let err = fetcher()
        .fetch_range(&url, ByteRange::new(0, 16))
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::NetworkReadFailure { .. }));
    assert!(err.is_retryable());
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn fetch_all_returns_whole_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/track.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 300]))
        .mount(&server)
        .await;

    let url = format!("{}/track.wav", server.uri());
    let body = fetcher().fetch_all(&url).await.unwrap();

    assert_eq!(body.len(), 300);
}

#[tokio::test]
async fn engine_streams_over_http_ranges() {
    let server = MockServer::start().await;
    for (range, body) in [
        ("bytes=0-3", &b"abcd"[..]),
        ("bytes=4-7", &b"efgh"[..]),
        ("bytes=8-11", &b"ij"[..]),
    ] {
        Mock::given(method("GET"))
            .and(path("/track.webm"))
            .and(header("range", range))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(body.to_vec()))
            .expect(1)
            .mount(&server)
            .await;
    }

    let url = format!("{}/track.webm", server.uri());
    let engine = IngestionEngine::new(
        Arc::new(fetcher()),
        PlatformCapabilities::new([OPUS]),
        StreamSettings {
            chunk_size: 4,
            ..StreamSettings::default()
        },
    );
    let sink = Arc::new(BufferedSink::new([OPUS]));
    let bindings = SessionBindings {
        element: Arc::new(AudioElement::new()),
        sink: sink.clone(),
        graph: None,
        cancel: CancellationToken::new(),
    };
    let mut session = engine.session(1, &url);

    let outcome = engine.run(&mut session, &bindings).await;

    assert!(matches!(
        outcome,
        SessionOutcome::Ended {
            bytes: 10,
            appends: 3
        }
    ));
    assert_eq!(&sink.buffered()[..], b"abcdefghij");
}
