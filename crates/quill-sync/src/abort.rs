//! Cancellation signal for in-flight network calls.

use std::sync::Arc;
use tokio::sync::watch;

/// Create a linked handle/signal pair.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    let tx = Arc::new(tx);
    (
        AbortHandle { tx: tx.clone() },
        AbortSignal {
            rx,
            _keepalive: tx,
        },
    )
}

/// Cancels the linked [`AbortSignal`].
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observed by in-flight fetches. An aborted call is never treated as a
/// failure requiring retry.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
    _keepalive: Arc<watch::Sender<bool>>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Arc::new(tx),
        }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the linked handle aborts.
    pub async fn aborted(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Every sender gone without an abort: stay pending.
                std::future::pending::<()>().await;
            }
        }
    }
}
