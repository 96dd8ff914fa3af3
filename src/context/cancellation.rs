//! Cooperative cancellation for one pipeline run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A cloneable cancellation flag shared between a request's owner and its
/// communication context.
///
/// Cancelling never interrupts a stage. Stages observe the flag at their
/// next suspension point, either by polling [`is_cancelled`](Self::is_cancelled)
/// or by racing their own work against [`cancelled`](Self::cancelled).
///
/// # Examples
///
/// ```
/// use pipewright::context::Cancellation;
///
/// let handle = Cancellation::new();
/// let observer = handle.clone();
/// assert!(!observer.is_cancelled());
/// handle.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation and wakes every task waiting in [`cancelled`](Self::cancelled).
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Registered before the flag check so a concurrent cancel cannot be missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
