//! Cooperative cancellation for a running pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    signal: Condvar,
}

/// Cloneable cancellation flag shared between the caller and the workers.
///
/// Workers check it before pulling new work; the orchestrator watches it and
/// cancels every stage queue once it is set.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait up to `timeout` for cancellation; returns whether it was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_cancelled() {
            return true;
        }
        let _ = self
            .inner
            .signal
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        self.is_cancelled()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let token = CancelToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_wait_timeout_wakes_on_cancel() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let cancelled = token.wait_timeout(Duration::from_secs(10));
                (cancelled, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        let (cancelled, elapsed) = waiter.join().unwrap();
        assert!(cancelled);
        assert!(elapsed < Duration::from_secs(5));
    }
}
