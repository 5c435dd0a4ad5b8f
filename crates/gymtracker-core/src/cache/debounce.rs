use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Coalesces bursts of requests into a single deferred run.
///
/// The first `schedule` call arms a timer; calls made before it fires are
/// absorbed. Once the timer fires the debouncer is re-armable, even while the
/// scheduled work is still running.
#[derive(Debug, Clone)]
pub struct Debouncer {
    armed: Arc<AtomicBool>,
    delay: Duration,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            armed: Arc::new(AtomicBool::new(false)),
            delay,
        }
    }

    /// Returns `false` when the call was absorbed by an already armed timer.
    pub fn schedule<F, Fut>(&self, work: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.armed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let armed = Arc::clone(&self.armed);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            armed.store(false, Ordering::Release);
            work().await;
        });
        true
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}
