//! Cooperative cancellation for blocking waits.
//!
//! Rust threads cannot be interrupted, so every blocking operation takes a
//! `CancellationToken`. A waiter registers a waker with the token for the
//! duration of its wait; `cancel()` flips the flag and runs every registered
//! waker. Wakers must take the waiter's lock before notifying so a waiter that
//! checked the flag under that lock cannot miss the wakeup.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Waker = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Wakers {
    next_id: u64,
    entries: Vec<(u64, Waker)>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    wakers: Mutex<Wakers>,
}

/// Cloneable cancellation handle. Clones share the same flag.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token nobody else holds, for callers that never cancel.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Cancel every current and future wait observing this token.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        // Run wakers outside the registry lock; they take the waiters' locks.
        let wakers: Vec<Waker> = {
            let mut registry = self.inner.wakers.lock();
            registry.entries.drain(..).map(|(_, w)| w).collect()
        };
        for wake in wakers {
            wake();
        }
    }

    /// Register `waker` until the returned registration is dropped.
    ///
    /// Register *before* checking `is_cancelled()` under the waiter's lock.
    pub fn register<F>(&self, waker: F) -> WakerRegistration
    where
        F: Fn() + Send + Sync + 'static,
    {
        let waker: Waker = Arc::new(waker);
        let mut registry = self.inner.wakers.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, waker));
        WakerRegistration {
            token: Arc::clone(&self.inner),
            id,
        }
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        self.inner.wakers.lock().entries.len()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Removes its waker from the token on drop.
pub struct WakerRegistration {
    token: Arc<TokenInner>,
    id: u64,
}

impl Drop for WakerRegistration {
    fn drop(&mut self) {
        let mut registry = self.token.wakers.lock();
        registry.entries.retain(|(id, _)| *id != self.id);
    }
}
