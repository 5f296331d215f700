use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Countdown that fires after `timeout` without a `touch()`.
///
/// After firing it stays quiet until the next `touch()`, which starts a new
/// countdown. Dropping the timer cancels it.
pub struct IdleTimer {
    touch_tx: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl IdleTimer {
    pub fn spawn(timeout: Duration, on_expire: impl Fn() + Send + 'static) -> Self {
        let (touch_tx, mut touch_rx) = mpsc::unbounded_channel::<()>();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    touched = touch_rx.recv() => {
                        if touched.is_none() {
                            return;
                        }
                    }
                    _ = tokio::time::sleep(timeout) => {
                        on_expire();
                        if touch_rx.recv().await.is_none() {
                            return;
                        }
                    }
                }
            }
        });
        Self { touch_tx, task }
    }

    /// Restarts the countdown, or re-arms it after it fired.
    pub fn touch(&self) {
        let _ = self.touch_tx.send(());
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
