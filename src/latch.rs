//! Countdown latch for waiting on a known number of completions.
//!
//! Built for mailbox hooks: `count_down` is synchronous and cheap, so it can
//! be called from the hook on a worker, while the observer awaits `wait`.

use tokio::sync::watch;

#[derive(Debug)]
pub struct CountdownLatch {
    remaining: watch::Sender<usize>,
}

impl CountdownLatch {
    pub fn new(count: usize) -> Self {
        let (remaining, _) = watch::channel(count);
        Self { remaining }
    }

    /// Decrement the counter. Saturates at zero.
    pub fn count_down(&self) {
        self.remaining.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub fn remaining(&self) -> usize {
        *self.remaining.borrow()
    }

    /// Resolve once the counter reaches zero.
    pub async fn wait(&self) {
        let mut rx = self.remaining.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn wait_returns_immediately_at_zero() {
        CountdownLatch::new(0).wait().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn wait_resolves_after_last_count_down() {
        let latch = Arc::new(CountdownLatch::new(3));

        let l = Arc::clone(&latch);
        let waiter = tokio::spawn(async move { l.wait().await });

        for _ in 0..3 {
            let l = Arc::clone(&latch);
            std::thread::spawn(move || l.count_down()).join().unwrap();
        }

        waiter.await.unwrap();
        assert_eq!(latch.remaining(), 0);
        latch.count_down();
        assert_eq!(latch.remaining(), 0);
    }
}
