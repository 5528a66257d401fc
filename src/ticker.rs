//! Background callback timer, grounded on the original's `RepeatedTimer`.
//!
//! The original's `threading.Timer`-based `RepeatedTimer` re-arms itself
//! from inside the callback *before* running the user function — so a slow
//! callback delays the next tick's wall-clock start but never compounds
//! across ticks. A spawned thread with a sleep loop gives the same property
//! as long as the sleep happens before the call, not after.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Default poll tick period (`HWConst.THERMAL_POLL_TIME` in the original).
pub const DEFAULT_POLLING_SECS: u64 = 30;
/// Default periodic-report period (`HWConst.REPORT_POLL_TIME`).
pub const DEFAULT_REPORT_SECS: u64 = 90;

/// Fires `callback` every `interval` on a dedicated thread until `stop()` is
/// called (or the ticker is dropped).
pub struct RepeatingTicker {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl RepeatingTicker {
    /// Spawns the worker thread immediately; the first callback fires after
    /// one full `interval`, matching the original's `RepeatedTimer.__init__`
    /// (which calls `start()`, itself a `Timer(interval, ...)`, not an
    /// immediate call).
    pub fn start<F>(interval: Duration, mut callback: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || loop {
            // Re-arm (wait) before invoking, so callback duration never
            // inflates the period.
            match stop_rx.recv_timeout(interval) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => callback(),
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Cancels the ticker and joins its thread. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RepeatingTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn fires_repeatedly_until_stopped() {
        let count = Arc::new(AtomicU32::new(0));
        let count_cb = count.clone();
        let mut ticker = RepeatingTicker::start(Duration::from_millis(10), move || {
            count_cb.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(55));
        ticker.stop();
        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 3, "expected at least 3 fires, got {fired}");
    }

    #[test]
    fn stop_is_idempotent() {
        let mut ticker = RepeatingTicker::start(Duration::from_secs(60), || {});
        ticker.stop();
        ticker.stop();
    }

    #[test]
    fn drop_without_explicit_stop_joins_cleanly() {
        let count = Arc::new(AtomicU32::new(0));
        let count_cb = count.clone();
        {
            let _ticker = RepeatingTicker::start(Duration::from_millis(5), move || {
                count_cb.fetch_add(1, Ordering::SeqCst);
            });
            thread::sleep(Duration::from_millis(20));
        }
        // no panic/hang on scope exit
    }
}
