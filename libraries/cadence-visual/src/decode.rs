//! In-memory decode of a whole track to mono PCM

use bytes::Bytes;
use cadence_core::{MediaError, Result};
use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// First channel of a decoded track
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Channel 0 samples in `[-1, 1]`
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Decode `data` and keep channel 0
///
/// CPU bound; call from a blocking context.
pub fn decode_first_channel(data: Bytes, extension: Option<&str>) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| MediaError::DecodeFailure(format!("Failed to probe stream: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| MediaError::DecodeFailure("No audio track found".to_string()))?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| MediaError::DecodeFailure(format!("Failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();
    let mut scratch: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(MediaError::DecodeFailure(format!(
                    "Error reading packet: {}",
                    e
                )))
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt packet; skip it like a player would
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = %e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(MediaError::DecodeFailure(format!("Decode error: {}", e))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let capacity = decoded.capacity() as u64;

        let undersized = scratch
            .as_ref()
            .map_or(true, |buffer| buffer.capacity() < decoded.capacity() * channels);
        if undersized {
            scratch = Some(SampleBuffer::new(capacity, spec));
        }
        if let Some(buffer) = scratch.as_mut() {
            buffer.copy_interleaved_ref(decoded);
            samples.extend(buffer.samples().iter().step_by(channels).copied());
        }
    }

    if samples.is_empty() {
        return Err(MediaError::DecodeFailure(
            "Stream contained no audio".to_string(),
        ));
    }

    debug!(samples = samples.len(), sample_rate, "Decoded first channel");

    Ok(DecodedAudio {
        samples: samples.into(),
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_a_decode_failure() {
        let err = decode_first_channel(Bytes::from_static(b"not audio at all"), None).unwrap_err();
        assert!(matches!(err, MediaError::DecodeFailure(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn duration_from_sample_count() {
        let audio = DecodedAudio {
            samples: vec![0.0; 22_050].into(),
            sample_rate: 44_100,
        };
        assert!((audio.duration_secs() - 0.5).abs() < 1e-9);
    }
}
