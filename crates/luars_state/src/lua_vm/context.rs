use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation signal attached to a thread.
///
/// Cloning a `Context` (or a thread carrying one) shares the same flag, so
/// cancelling any copy cancels them all. The flag may be raised from another
/// OS thread.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}
