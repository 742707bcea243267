use std::time::Duration;
use tokio::sync::watch;

/// Owner side of the engine-wide shutdown flag.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Raises the flag. Returns `true` only for the call that raised it.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side, cloned into every loop.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is raised or the trigger is dropped.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|&stop| stop).await;
    }

    /// Sleeps for `duration`; returns `false` if shutdown cut it short.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.triggered() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn trigger_is_reported_once() {
        let trigger = ShutdownTrigger::new();
        let signal = trigger.subscribe();
        assert!(!signal.is_triggered());
        assert!(trigger.trigger());
        assert!(!trigger.trigger());
        assert!(signal.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_interrupted_by_shutdown() {
        let trigger = ShutdownTrigger::new();
        let mut signal = trigger.subscribe();
        let sleeper = tokio::spawn(async move { signal.sleep(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.trigger();
        assert!(!sleeper.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trigger_counts_as_shutdown() {
        let trigger = ShutdownTrigger::new();
        let mut signal = trigger.subscribe();
        drop(trigger);
        assert!(!signal.sleep(Duration::from_secs(5)).await);
    }
}
