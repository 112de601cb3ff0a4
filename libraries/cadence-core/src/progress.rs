//! Externally owned playback progress

use tokio::sync::watch;

/// Play head and duration, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackProgress {
    pub current_time: f64,
    pub duration: Option<f64>,
}

impl PlaybackProgress {
    pub fn new(current_time: f64, duration: Option<f64>) -> Self {
        Self {
            current_time,
            duration,
        }
    }

    /// Duration usable for position math: finite and positive
    pub fn known_duration(&self) -> Option<f64> {
        self.duration.filter(|d| d.is_finite() && *d > 0.0)
    }

    /// Fraction of the track already played, in [0, 1]
    ///
    /// Unknown or zero duration yields 0.
    pub fn ratio(&self) -> f64 {
        match self.known_duration() {
            Some(duration) if self.current_time.is_finite() => {
                (self.current_time / duration).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }
}

/// Progress store the pipeline reads from and commits seeks to
pub trait ProgressStore: Send + Sync {
    fn progress(&self) -> PlaybackProgress;

    /// Commit a user seek
    fn commit_seek(&self, seconds: f64);
}

/// `ProgressStore` backed by a watch channel
///
/// Renderers subscribe to position updates instead of polling.
#[derive(Debug)]
pub struct ProgressCell {
    tx: watch::Sender<PlaybackProgress>,
}

impl ProgressCell {
    pub fn new(initial: PlaybackProgress) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publish a new play head position (e.g. from a time-update event)
    ///
    /// A `NaN`, infinite or non-positive duration is stored as unknown.
    pub fn update(&self, current_time: f64, duration: Option<f64>) {
        let progress = PlaybackProgress::new(current_time, duration);
        self.tx.send_replace(PlaybackProgress {
            duration: progress.known_duration(),
            ..progress
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackProgress> {
        self.tx.subscribe()
    }
}

impl Default for ProgressCell {
    fn default() -> Self {
        Self::new(PlaybackProgress::default())
    }
}

impl ProgressStore for ProgressCell {
    fn progress(&self) -> PlaybackProgress {
        *self.tx.borrow()
    }

    fn commit_seek(&self, seconds: f64) {
        if seconds.is_nan() {
            return;
        }
        self.tx.send_modify(|progress| {
            let upper = progress.known_duration().unwrap_or(f64::INFINITY);
            progress.current_time = seconds.clamp(0.0, upper);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ratio_handles_unknown_duration() {
        assert_eq!(PlaybackProgress::new(10.0, None).ratio(), 0.0);
        assert_eq!(PlaybackProgress::new(10.0, Some(0.0)).ratio(), 0.0);
        assert_eq!(PlaybackProgress::new(30.0, Some(120.0)).ratio(), 0.25);
        assert_eq!(PlaybackProgress::new(500.0, Some(120.0)).ratio(), 1.0);
    }

    #[test]
    fn commit_seek_is_observed_by_subscribers() {
        let cell = ProgressCell::new(PlaybackProgress::new(0.0, Some(200.0)));
        let mut rx = cell.subscribe();

        cell.commit_seek(50.0);

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().current_time, 50.0);
        assert_eq!(cell.progress().current_time, 50.0);
    }

    #[test]
    fn unusable_duration_is_stored_as_unknown() {
        let cell = ProgressCell::default();
        for duration in [f64::NAN, -1.0, 0.0, f64::INFINITY] {
            cell.update(2.0, Some(duration));
            assert_eq!(cell.progress().duration, None);

            cell.commit_seek(3.0);
            assert_eq!(cell.progress().current_time, 3.0);
        }
    }

    #[test]
    fn commit_seek_tolerates_a_foreign_duration() {
        // Field set directly, bypassing `update`
        let cell = ProgressCell::new(PlaybackProgress::new(1.0, Some(f64::NAN)));
        cell.commit_seek(3.0);
        assert_eq!(cell.progress().current_time, 3.0);

        let cell = ProgressCell::new(PlaybackProgress::new(1.0, Some(-5.0)));
        cell.commit_seek(3.0);
        assert_eq!(cell.progress().current_time, 3.0);

        cell.commit_seek(f64::NAN);
        assert_eq!(cell.progress().current_time, 3.0);
    }

    #[test]
    fn commit_seek_clamps_to_duration() {
        let cell = ProgressCell::new(PlaybackProgress::new(0.0, Some(100.0)));
        cell.commit_seek(150.0);
        assert_eq!(cell.progress().current_time, 100.0);
    }

    proptest! {
        #[test]
        fn ratio_stays_in_unit_range(current in any::<f64>(), duration in any::<f64>()) {
            let ratio = PlaybackProgress::new(current, Some(duration)).ratio();
            prop_assert!((0.0..=1.0).contains(&ratio));
        }

        #[test]
        fn seek_never_leaves_the_track(duration in any::<f64>(), seconds in any::<f64>()) {
            let cell = ProgressCell::new(PlaybackProgress::new(0.0, Some(duration)));
            cell.commit_seek(seconds);

            let progress = cell.progress();
            prop_assert!(progress.current_time >= 0.0);
            if let Some(known) = progress.known_duration() {
                prop_assert!(progress.current_time <= known);
            }
        }
    }
}
