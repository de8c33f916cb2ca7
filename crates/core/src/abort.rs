//! Caller-driven cancellation for in-flight requests.

use std::future::Future;
use tokio::sync::watch;

/// Triggers cancellation of every linked [`AbortSignal`].
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Create a handle and its first signal.
    pub fn pair() -> (Self, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, AbortSignal { rx })
    }

    /// Another signal linked to this handle.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes an [`AbortHandle`].
#[derive(Clone, Debug)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the handle aborts. Pends forever if the handle is dropped first.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Drive `fut` unless the signal fires first, in which case `fut` is dropped.
    pub async fn guard<F: Future>(&self, fut: F) -> crate::Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.aborted() => Err(crate::Error::Aborted),
            out = fut => Ok(out),
        }
    }
}
