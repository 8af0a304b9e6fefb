use tokio::sync::watch;

/// Raises the abort flag of one turn.
#[derive(Debug)]
pub struct CancelTrigger {
    tx: watch::Sender<bool>,
}

impl CancelTrigger {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by a running turn. Cloning shares the same flag.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal nobody can raise.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flag is raised. Pends forever if the trigger is gone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            let raised = *rx.borrow_and_update();
            if raised {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[must_use]
pub fn cancel_pair() -> (CancelTrigger, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelTrigger { tx }, CancelSignal { rx })
}

#[cfg(test)]
mod tests {
    use super::{cancel_pair, CancelSignal};
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_resolves_after_trigger() {
        let (trigger, signal) = cancel_pair();
        assert!(!signal.is_cancelled());
        trigger.cancel();
        assert!(signal.is_cancelled());
        let waited = tokio::time::timeout(Duration::from_secs(1), signal.cancelled()).await;
        assert!(waited.is_ok());
        assert!(signal.clone().is_cancelled());
    }

    #[tokio::test]
    async fn never_signal_does_not_resolve() {
        let signal = CancelSignal::never();
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
    }
}
