//! Cadence - Chunked Streaming
//!
//! Feeds a playback element from ranged reads instead of one progressive
//! download:
//!
//! - `PlatformCapabilities` decides once per session between chunked and
//!   direct delivery
//! - `RangeFetcher` reads byte windows (`HttpRangeFetcher` over HTTP)
//! - `MediaSink` is the incremental buffer the element plays from
//! - `CrossfadeMask` hides append glitches behind a short gain dip
//! - `IngestionEngine` runs the fetch/append loop for one `StreamSession`
//! - `StreamController` keeps at most one live session per element
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_core::{AudioElement, StreamSettings};
//! use cadence_stream::{
//!     BufferedSink, HttpRangeFetcher, IngestionEngine, PlatformCapabilities, StreamController,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> cadence_core::Result<()> {
//! let settings = StreamSettings::default();
//! let fetcher = Arc::new(HttpRangeFetcher::new(settings.request_timeout())?);
//! let caps = PlatformCapabilities::new([settings.mime_type.as_str()]);
//! let sink = Arc::new(BufferedSink::new([settings.mime_type.as_str()]));
//!
//! let engine = Arc::new(IngestionEngine::new(fetcher, caps, settings));
//! let controller = StreamController::new(engine, Arc::new(AudioElement::new()));
//!
//! let handle = controller.play("https://cdn.example.com/track.webm", sink);
//! let report = handle.finish().await.expect("session task");
//! println!("{:?}", report.outcome);
//! # Ok(())
//! # }
//! ```

mod capability;
mod controller;
mod crossfade;
mod engine;
mod fetch;
mod session;
mod sink;

pub use capability::{DeliveryMode, FallbackReason, PlatformCapabilities};
pub use controller::{SessionHandle, SessionReport, StreamController};
pub use crossfade::CrossfadeMask;
pub use engine::{IngestionEngine, SessionBindings};
pub use fetch::{ByteRange, HttpRangeFetcher, MemoryFetcher, RangeFetcher};
pub use session::{SessionOutcome, SessionState, StreamSession};
pub use sink::{BufferedSink, MediaSink, SinkReadyState};
