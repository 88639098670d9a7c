use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error};

/// Receiving side of a process-wide shutdown signal
///
/// Every worker loop holds its own clone and races its sleeps against it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending side of the shutdown signal
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // no receivers left is fine
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is triggered (or the trigger is gone)
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `duration`; returns `false` if shutdown interrupted the sleep
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.wait() => true,
        };
        !interrupted && !self.is_triggered()
    }
}

/// Trigger shutdown on SIGINT or SIGTERM
pub fn trigger_on_signal(trigger: ShutdownTrigger) {
    tokio::spawn(async move {
        wait_for_signal().await;
        debug!("termination signal received");
        trigger.trigger();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            error!("could not install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_completes_without_shutdown() {
        let (_trigger, mut shutdown) = shutdown_channel();

        assert!(shutdown.sleep(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_shutdown() {
        let (trigger, mut shutdown) = shutdown_channel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        let completed = tokio::time::timeout(
            Duration::from_secs(2),
            shutdown.sleep(Duration::from_secs(60)),
        )
        .await
        .unwrap();

        assert!(!completed);
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_trigger_releases_waiters() {
        let (trigger, mut shutdown) = shutdown_channel();
        drop(trigger);

        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .unwrap();
    }
}
