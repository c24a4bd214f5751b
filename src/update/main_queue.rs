use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::mpsc;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Serial execution context for observer callbacks.
///
/// Jobs run one at a time, in the order they were dispatched, on a single
/// background task. Nothing dispatched here should block or do I/O.
#[derive(Clone)]
pub struct MainQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl MainQueue {
    /// Start the queue's drain task. Must be called inside a tokio runtime.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    warn!("Main queue job panicked");
                }
            }
            debug!("Main queue drained and closed");
        });

        Self { tx }
    }

    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            warn!("Main queue is closed, dropping callback");
        }
    }

    /// Resolves once every job dispatched before this call has run.
    pub async fn flush(&self) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.dispatch(move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }
}
