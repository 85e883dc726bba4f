//! Cooperative cancellation for a pipeline run

use std::future::Future;
use std::io;
use tokio::sync::watch;
use tracing::warn;

/// Create a linked handle/signal pair
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

/// Triggers cancellation. Held by whoever owns the run (the CLI's signal handler).
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        // send_replace never fails, even with no receivers left
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal { rx: self.tx.subscribe() }
    }

    /// Trigger once `listener` reports a signal. A listener that fails to
    /// install is logged and never triggers; the future then pends forever.
    pub async fn trigger_on<F>(self, listener: F)
    where
        F: Future<Output = io::Result<()>>,
    {
        match listener.await {
            Ok(()) => {
                warn!("Shutdown requested, stopping workers");
                self.trigger();
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for shutdown signals");
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Observes cancellation. Cheap to clone into every task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is triggered. Pends forever if the handle is
    /// dropped without triggering.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
