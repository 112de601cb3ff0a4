//! Background reduction worker
//!
//! Reducing a decoded track to one RMS value per bar is the only CPU-heavy
//! step of the waveform pipeline. Each request gets a fresh OS thread that
//! answers exactly once over a one-shot channel and is joined afterwards.

use cadence_core::{MediaError, Result};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Work item handed to the worker thread
#[derive(Debug, Clone)]
pub struct ReductionRequest {
    /// Mono PCM; ownership moves to the worker
    pub samples: Arc<[f32]>,
    pub num_bars: usize,
}

/// RMS of `num_bars` equal, consecutive windows, each clamped to `[0, 1]`
///
/// The window is `floor(len / num_bars)` samples; trailing samples that do
/// not fill a whole window are ignored.
///
/// # Errors
/// `MediaError::WorkerFailure` if there are fewer samples than bars.
pub fn rms_bars(samples: &[f32], num_bars: usize) -> Result<Vec<f32>> {
    if num_bars == 0 {
        return Ok(Vec::new());
    }

    let window = samples.len() / num_bars;
    if window == 0 {
        return Err(MediaError::WorkerFailure(format!(
            "{} samples cannot fill {} bars",
            samples.len(),
            num_bars
        )));
    }

    Ok(samples
        .chunks_exact(window)
        .take(num_bars)
        .map(|chunk| {
            let sum_sq: f64 = chunk.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
            ((sum_sq / window as f64).sqrt() as f32).clamp(0.0, 1.0)
        })
        .collect())
}

/// Run `request` on a dedicated thread
///
/// The returned future resolves with the single response. A worker that
/// panics or disappears resolves to `MediaError::WorkerFailure`.
pub async fn spawn_reduction(request: ReductionRequest) -> Result<Vec<f32>> {
    let (reply_tx, reply_rx) = oneshot::channel();
    let num_bars = request.num_bars;

    let worker = thread::Builder::new()
        .name("cadence-waveform-worker".to_string())
        .spawn(move || {
            let ReductionRequest { samples, num_bars } = request;
            let result = rms_bars(&samples, num_bars);
            // Receiver gone means the load was abandoned
            let _ = reply_tx.send(result);
        })
        .map_err(|e| MediaError::WorkerFailure(format!("Failed to spawn worker: {}", e)))?;

    let reply = reply_rx.await;

    // The worker has sent (or died); joining cannot block for long
    let joined = tokio::task::spawn_blocking(move || worker.join()).await;
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(_)) => warn!(num_bars, "Waveform worker panicked"),
        Err(e) => warn!(num_bars, error = %e, "Waveform worker join failed"),
    }

    let bars = reply.map_err(|_| {
        MediaError::WorkerFailure("worker exited without replying".to_string())
    })??;
    debug!(num_bars = bars.len(), "Waveform reduction complete");
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn constant_signal_has_constant_rms() {
        let samples = vec![0.5f32; 1000];
        let bars = rms_bars(&samples, 10).unwrap();
        assert_eq!(bars.len(), 10);
        assert!(bars.iter().all(|&b| (b - 0.5).abs() < 1e-6));
    }

    #[test]
    fn windows_are_equal_and_ordered() {
        // Two windows of 2: silence, then full scale
        let bars = rms_bars(&[0.0, 0.0, 1.0, -1.0, 0.9], 2).unwrap();
        assert_eq!(bars, vec![0.0, 1.0]);
    }

    #[test]
    fn too_few_samples_fail() {
        assert!(matches!(
            rms_bars(&[0.1, 0.2], 3),
            Err(MediaError::WorkerFailure(_))
        ));
        assert!(rms_bars(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn rms_is_clamped() {
        let bars = rms_bars(&[4.0; 8], 2).unwrap();
        assert_eq!(bars, vec![1.0, 1.0]);
    }

    #[tokio::test]
    async fn worker_replies_once_and_exits() {
        let request = ReductionRequest {
            samples: vec![0.25f32; 4410].into(),
            num_bars: 68,
        };
        let bars = spawn_reduction(request).await.unwrap();
        assert_eq!(bars.len(), 68);
    }

    #[tokio::test]
    async fn worker_failure_is_reported() {
        let request = ReductionRequest {
            samples: vec![0.25f32; 10].into(),
            num_bars: 68,
        };
        assert!(matches!(
            spawn_reduction(request).await,
            Err(MediaError::WorkerFailure(_))
        ));
    }

    proptest! {
        #[test]
        fn bar_count_and_range(len in 1usize..5000, bars in 1usize..200) {
            let samples: Vec<f32> = (0..len).map(|i| ((i as f32) * 0.37).sin()).collect();
            match rms_bars(&samples, bars) {
                Ok(values) => {
                    prop_assert_eq!(values.len(), bars);
                    prop_assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
                }
                Err(_) => prop_assert!(len < bars),
            }
        }
    }
}
