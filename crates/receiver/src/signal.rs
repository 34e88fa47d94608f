//! Cooperative cancellation built on a tokio `watch` channel.

use std::sync::Arc;

use tokio::sync::watch;

/// Create a connected trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx: Arc::new(tx) }, ShutdownSignal { rx })
}

/// The sending half. Triggering is idempotent.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// The observing half, handed to collectors, consumers and the loop.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation has been triggered.
    ///
    /// Never resolves if every trigger was dropped without firing.
    pub async fn cancelled(&self) {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_waiters() {
        let (trigger, signal) = shutdown_channel();
        let waiter = tokio::spawn(async move { signal.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let (trigger, signal) = shutdown_channel();
        trigger.trigger();
        trigger.trigger();
        assert!(signal.is_cancelled());
        tokio::time::timeout(Duration::from_millis(50), signal.cancelled())
            .await
            .expect("should resolve immediately");
    }

    #[tokio::test]
    async fn subscribers_see_trigger() {
        let (trigger, _signal) = shutdown_channel();
        let late = trigger.subscribe();
        assert!(!late.is_cancelled());
        trigger.trigger();
        assert!(late.is_cancelled());
        assert!(trigger.is_triggered());
    }

    #[tokio::test]
    async fn never_does_not_fire() {
        let signal = ShutdownSignal::never();
        assert!(!signal.is_cancelled());
        let res = tokio::time::timeout(Duration::from_millis(30), signal.cancelled()).await;
        assert!(res.is_err());
    }
}
