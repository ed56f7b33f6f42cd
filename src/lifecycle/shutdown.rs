//! Shutdown coordination for the tunnel endpoints.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Servers subscribe before they start; `trigger` tells all of them to stop
/// accepting and drain.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber. Calling it again is harmless.
    pub fn trigger(&self) {
        let subscribers = self.tx.send(()).unwrap_or(0);
        tracing::info!(subscribers, "Shutdown triggered");
    }

    /// Number of subscribers still holding a receiver.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Await `task`, giving up once `deadline` passes after shutdown began.
    ///
    /// Returns `None` if the task did not finish in time.
    pub async fn drain<F: Future>(&self, task: F, deadline: Duration) -> Option<F::Output> {
        let mut rx = self.subscribe();
        tokio::pin!(task);
        tokio::select! {
            out = &mut task => return Some(out),
            _ = rx.recv() => {}
        }
        match tokio::time::timeout(deadline, task).await {
            Ok(out) => Some(out),
            Err(_) => {
                tracing::warn!(deadline_secs = deadline.as_secs_f64(), "Drain deadline passed, abandoning in-flight work");
                None
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
