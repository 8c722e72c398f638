//! Cooperative stop signal shared by the scan loop and calibration session.
//!
//! Stopping is never pre-emptive. Long-running loops check the signal
//! between discrete steps or race it against an idle wait.

use std::time::Duration;
use tokio::sync::watch;

/// Requests a stop. Cloneable; any clone can trigger.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

/// Observes stop requests.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

/// Creates a connected handle/signal pair.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

impl StopHandle {
    /// Marks the stop flag. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Clears the flag so the next mode starts fresh.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    /// A new signal observing this handle.
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl StopSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop is requested. Pending forever if every handle is dropped.
    pub async fn stopped(&mut self) {
        let closed = self.rx.wait_for(|stopped| *stopped).await.map(|_| ()).is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    /// Sleeps for `duration` unless a stop arrives first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_stopped() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.stopped() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_full_duration_without_stop() {
        let (_handle, mut signal) = stop_channel();
        let start = tokio::time::Instant::now();
        assert!(signal.sleep(Duration::from_secs(5)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_cut_short_by_stop() {
        let (handle, mut signal) = stop_channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.trigger();
        });
        let start = tokio::time::Instant::now();
        assert!(!signal.sleep(Duration::from_secs(5)).await);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(signal.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_signal_does_not_fire() {
        let mut signal = StopSignal::never();
        assert!(signal.sleep(Duration::from_secs(1)).await);
        assert!(!signal.is_stopped());
    }

    #[test]
    fn test_reset_clears_flag() {
        let (handle, signal) = stop_channel();
        handle.trigger();
        assert!(signal.is_stopped());
        handle.reset();
        assert!(!signal.is_stopped());
    }
}
