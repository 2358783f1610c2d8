//! Cooperative cancellation shared by every long-running loop

use std::time::Duration;
use tokio::sync::watch;

/// Sender half; dropping it without calling [`ShutdownTrigger::trigger`]
/// leaves the receivers running forever.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // Only fails when every receiver is gone, which is fine
        let _ = self.tx.send(true);
    }
}

/// Receiver half, cloned into each loop
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl Shutdown {
    /// A receiver that never fires
    pub fn never() -> Self {
        shutdown_channel().1
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration` unless shutdown arrives first.
    /// Returns `false` when the sleep was cut short.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.wait() => false,
        }
    }
}
