//! Cancel-on-drop timer for idle rooms.

use std::time::Duration;

use tokio::task::JoinHandle;

/// A one-shot timer running on its own task.
///
/// The callback runs once `after` has elapsed unless the timer is
/// cancelled or dropped first. Rooms keep one while they wait for a game
/// to start; the callback only posts a signal to the hub, which decides
/// whether the room is still eligible for destruction.
#[derive(Debug)]
pub struct IdleTimer {
    handle: JoinHandle<()>,
}

impl IdleTimer {
    /// Arms the timer. Must be called inside a Tokio runtime.
    pub fn arm<F>(after: Duration, on_expiry: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            on_expiry();
        });
        Self { handle }
    }

    /// Stops the timer. The callback won't run if it hasn't already.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn flag() -> (Arc<AtomicBool>, impl FnOnce() + Send + 'static) {
        let fired = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&fired);
        (fired, move || setter.store(true, Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_duration() {
        let (fired, on_expiry) = flag();
        let _timer = IdleTimer::arm(Duration::from_secs(10), on_expiry);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (fired, on_expiry) = flag();
        let timer = IdleTimer::arm(Duration::from_secs(10), on_expiry);
        timer.cancel();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_timer_never_fires() {
        let (fired, on_expiry) = flag();
        drop(IdleTimer::arm(Duration::from_secs(10), on_expiry));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
