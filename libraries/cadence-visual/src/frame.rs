//! Cancellable per-frame task

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Repeating task that calls a frame callback at a fixed period
///
/// Dropping the loop cancels it. The callback returns `false` to stop the
/// loop from the inside.
#[derive(Debug)]
pub struct FrameLoop {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FrameLoop {
    /// Start calling `frame` every `period`, first tick immediately
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(period: Duration, mut frame: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let period = period.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if token.is_cancelled() || !frame() {
                            break;
                        }
                    }
                }
            }
            trace!("Frame loop stopped");
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Request the loop to stop; no frame starts after this returns
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the task to exit
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
