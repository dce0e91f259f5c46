use std::time::Duration;

use tokio::task::JoinHandle;

/// Fixed delay before a reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Holds at most one pending reconnect. Scheduling aborts whatever
/// was pending, so rapid disconnects never stack timers.
#[derive(Debug)]
pub struct ReconnectTimer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Default for ReconnectTimer {
    fn default() -> Self {
        Self::new(RECONNECT_DELAY)
    }
}

impl ReconnectTimer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `fire` once after the delay, replacing any pending timer.
    pub fn schedule<F>(&mut self, fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire();
        }));
    }

    /// Drop the pending timer, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let c = fired.clone();
        let make = move || {
            let c = c.clone();
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (fired, make)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (fired, make) = counter();
        let mut timer = ReconnectTimer::default();
        timer.schedule(make());
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn second_schedule_replaces_first() {
        let (fired, make) = counter();
        let mut timer = ReconnectTimer::default();
        timer.schedule(make());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        timer.schedule(make());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        tokio::task::yield_now().await;
        // first would have fired at 3000 ms
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let (fired, make) = counter();
        let mut timer = ReconnectTimer::default();
        timer.schedule(make());
        timer.cancel();
        assert!(!timer.is_pending());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
