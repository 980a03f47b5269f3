//! Cancellable one-shot timer firing into an async channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{self, Duration};

/// A cancellable one-shot timer. `kickoff` (re)arms the timer; a later
/// `kickoff` or `cancel` supersedes any armed deadline. `timeout` resolves
/// once per deadline that actually expired, and pends forever while the
/// timer is disarmed.
pub struct Timer {
    generation: Arc<AtomicU64>,
    fire_tx: mpsc::UnboundedSender<()>,
    fire_rx: mpsc::UnboundedReceiver<()>,
}

impl Timer {
    /// Creates a new, disarmed timer.
    pub fn new() -> Self {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        Timer {
            generation: Arc::new(AtomicU64::new(0)),
            fire_tx,
            fire_rx,
        }
    }

    /// Arms the timer to fire after `dur`, superseding any armed deadline.
    /// Expirations of earlier deadlines still sitting in the channel are
    /// discarded.
    pub fn kickoff(&mut self, dur: Duration) {
        while self.fire_rx.try_recv().is_ok() {}
        let armed = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        let fire_tx = self.fire_tx.clone();
        tokio::spawn(async move {
            time::sleep(dur).await;
            // only the most recent kickoff may fire
            if generation.load(Ordering::SeqCst) == armed {
                let _ = fire_tx.send(());
            }
        });
    }

    /// Disarms the timer. A deadline that already fired may still sit in
    /// the channel; consumers guard on their own armed flag.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Waits for the next expiration.
    pub async fn timeout(&mut self) {
        // never closed: self also holds a sender
        let _ = self.fire_rx.recv().await;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
