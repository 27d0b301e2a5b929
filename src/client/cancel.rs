//! Cancellation of in-flight query execution
//!
//! A [`CancellationHandle`] flips a shared flag; every [`CancellationSignal`]
//! derived from it observes the flip. Signals whose handle was dropped
//! without cancelling never fire.

use std::sync::Arc;
use tokio::sync::watch;

/// Requests cancellation
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    sender: Arc<watch::Sender<bool>>,
}

/// Observes cancellation
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    receiver: watch::Receiver<bool>,
}

/// Create a connected handle and signal
pub fn cancellation() -> (CancellationHandle, CancellationSignal) {
    let (sender, receiver) = watch::channel(false);
    (
        CancellationHandle {
            sender: Arc::new(sender),
        },
        CancellationSignal { receiver },
    )
}

impl CancellationHandle {
    /// Cancel every signal derived from this handle
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Another signal connected to this handle
    pub fn signal(&self) -> CancellationSignal {
        CancellationSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

impl CancellationSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // handle dropped without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_signal() {
        let (handle, signal) = cancellation();
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.cancelled().await }
        });
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_cancelled());
        assert!(handle.signal().is_cancelled());
    }

    #[tokio::test]
    async fn test_never_does_not_fire() {
        let signal = CancellationSignal::never();
        let result = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(result.is_err());
        assert!(!signal.is_cancelled());
    }
}
