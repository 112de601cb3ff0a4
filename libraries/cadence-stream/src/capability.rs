//! Delivery-mode selection
//!
//! Capability checks happen once, at session start, and produce a tagged
//! `DeliveryMode`. The fetch loop never re-probes the platform.

use std::fmt;

/// Why a session abandoned chunked delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The platform has no incremental buffering sink at all
    IncrementalBufferingUnavailable,

    /// The sink cannot buffer the negotiated container/codec
    UnsupportedEncoding(String),

    /// The sink refused an append mid-stream
    AppendRejected(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncrementalBufferingUnavailable => write!(f, "incremental buffering unavailable"),
            Self::UnsupportedEncoding(mime) => write!(f, "unsupported encoding {}", mime),
            Self::AppendRejected(reason) => write!(f, "append rejected: {}", reason),
        }
    }
}

/// How a session will deliver audio to the element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Ranged reads appended to a sink buffer of this MIME type
    Chunked { mime: String },

    /// URL assigned to the element for native progressive download
    Direct(FallbackReason),
}

/// What the current platform can do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCapabilities {
    incremental_buffering: bool,
    supported_types: Vec<String>,
}

impl PlatformCapabilities {
    /// Platform with an incremental sink accepting `supported_types`
    pub fn new<I, S>(supported_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            incremental_buffering: true,
            supported_types: supported_types
                .into_iter()
                .map(|mime| normalize_mime(mime.as_ref()))
                .collect(),
        }
    }

    /// Platform without any incremental buffering sink
    pub fn unavailable() -> Self {
        Self {
            incremental_buffering: false,
            supported_types: Vec::new(),
        }
    }

    pub fn incremental_buffering(&self) -> bool {
        self.incremental_buffering
    }

    /// Whether `mime` can be buffered incrementally
    pub fn supports(&self, mime: &str) -> bool {
        let wanted = normalize_mime(mime);
        self.incremental_buffering && self.supported_types.iter().any(|t| *t == wanted)
    }

    /// Choose the delivery mode for `mime`
    pub fn select_delivery(&self, mime: &str) -> DeliveryMode {
        if !self.incremental_buffering {
            DeliveryMode::Direct(FallbackReason::IncrementalBufferingUnavailable)
        } else if !self.supports(mime) {
            DeliveryMode::Direct(FallbackReason::UnsupportedEncoding(mime.to_string()))
        } else {
            DeliveryMode::Chunked {
                mime: mime.to_string(),
            }
        }
    }
}

/// Lowercase and strip whitespace so `audio/webm; codecs="opus"` and
/// `audio/webm;codecs="opus"` compare equal
pub(crate) fn normalize_mime(mime: &str) -> String {
    mime.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPUS: &str = "audio/webm; codecs=\"opus\"";

    #[test]
    fn chunked_when_type_supported() {
        let caps = PlatformCapabilities::new([OPUS]);
        assert_eq!(
            caps.select_delivery(OPUS),
            DeliveryMode::Chunked {
                mime: OPUS.to_string()
            }
        );
    }

    #[test]
    fn direct_without_incremental_buffering() {
        let caps = PlatformCapabilities::unavailable();
        assert_eq!(
            caps.select_delivery(OPUS),
            DeliveryMode::Direct(FallbackReason::IncrementalBufferingUnavailable)
        );
    }

    #[test]
    fn direct_for_unsupported_type() {
        let caps = PlatformCapabilities::new(["audio/mpeg"]);
        assert!(matches!(
            caps.select_delivery(OPUS),
            DeliveryMode::Direct(FallbackReason::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn mime_comparison_ignores_spacing_and_case() {
        let caps = PlatformCapabilities::new(["Audio/WebM;codecs=\"opus\""]);
        assert!(caps.supports(OPUS));
    }

    #[test]
    fn selection_is_pure() {
        let caps = PlatformCapabilities::new([OPUS]);
        assert_eq!(caps.select_delivery(OPUS), caps.select_delivery(OPUS));
    }
}
