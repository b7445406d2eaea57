//! Memory-bounded queue decorator.
//!
//! Every enqueue acquires budget for the element *before* it reaches the
//! store; every dequeue releases budget only *after* an element actually left
//! the store. Nothing else is tracked here: the store owns order and presence,
//! the limiter owns the bytes.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use membound_core::cancel::CancellationToken;
use membound_core::config::QueueConfig;
use membound_core::error::Result;
use membound_core::estimate::SizeEstimator;
use membound_mem::MemoryLimiter;

use crate::store::{FifoStore, LinkedStore};

/// An element the queue did not accept, handed back to the caller.
#[derive(Error)]
pub enum EnqueueError<E> {
    #[error("memory budget exhausted")]
    Full(E),

    #[error("timed out waiting for memory budget")]
    Timeout(E),

    #[error("enqueue cancelled while waiting for memory budget")]
    Cancelled(E),
}

impl<E> EnqueueError<E> {
    pub fn into_inner(self) -> E {
        match self {
            EnqueueError::Full(e) | EnqueueError::Timeout(e) | EnqueueError::Cancelled(e) => e,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EnqueueError::Cancelled(_))
    }
}

// Elements need not be `Debug`.
impl<E> fmt::Debug for EnqueueError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnqueueError::Full(_) => f.write_str("Full(..)"),
            EnqueueError::Timeout(_) => f.write_str("Timeout(..)"),
            EnqueueError::Cancelled(_) => f.write_str("Cancelled(..)"),
        }
    }
}

/// A FIFO whose admission is governed by the estimated bytes it holds.
pub struct MemoryBoundedQueue<E, S = LinkedStore<E>> {
    store: S,
    limiter: MemoryLimiter<E>,
}

impl<E: Send + 'static> MemoryBoundedQueue<E, LinkedStore<E>> {
    /// Queue over a fresh [`LinkedStore`] with a `limit`-byte budget.
    pub fn with_limit<Z>(limit: usize, estimator: Z) -> Result<Self>
    where
        Z: SizeEstimator<E> + 'static,
    {
        Ok(Self::new(
            LinkedStore::new(),
            MemoryLimiter::new(limit, estimator)?,
        ))
    }

    pub fn from_config<Z>(cfg: &QueueConfig, estimator: Z) -> Result<Self>
    where
        Z: SizeEstimator<E> + 'static,
    {
        Ok(Self::new(
            LinkedStore::new(),
            MemoryLimiter::from_config(cfg, estimator)?,
        ))
    }
}

impl<E, S: FifoStore<E>> MemoryBoundedQueue<E, S> {
    pub fn new(store: S, limiter: MemoryLimiter<E>) -> Self {
        Self { store, limiter }
    }

    pub fn limiter(&self) -> &MemoryLimiter<E> {
        &self.limiter
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    // ----- enqueue -----

    /// Wait for budget, then append. A cancelled wait hands the element back
    /// untouched and leaves the accounting as it was.
    pub fn enqueue(
        &self,
        element: E,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), EnqueueError<E>> {
        match self.limiter.acquire(&element, cancel) {
            Ok(()) => {
                self.store.put(element);
                Ok(())
            }
            Err(_) => Err(EnqueueError::Cancelled(element)),
        }
    }

    /// Wait at most `timeout` for budget, then append.
    pub fn enqueue_timeout(
        &self,
        element: E,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), EnqueueError<E>> {
        match self.limiter.acquire_timeout(&element, timeout, cancel) {
            Ok(true) => {
                self.store.put(element);
                Ok(())
            }
            Ok(false) => Err(EnqueueError::Timeout(element)),
            Err(_) => Err(EnqueueError::Cancelled(element)),
        }
    }

    /// Append only if the budget admits the element right now.
    pub fn try_enqueue(&self, element: E) -> std::result::Result<(), EnqueueError<E>> {
        if !self.limiter.try_acquire(&element) {
            return Err(EnqueueError::Full(element));
        }
        match self.store.offer(element) {
            Ok(()) => Ok(()),
            Err(element) => {
                // The store refused it: give the bytes back.
                self.limiter.release(&element);
                Err(EnqueueError::Full(element))
            }
        }
    }

    // ----- dequeue -----

    /// Wait for the head, then release its bytes.
    pub fn dequeue(&self, cancel: &CancellationToken) -> Result<E> {
        let element = self.store.take(cancel)?;
        // The element already left the store, so its bytes are held and the
        // release cannot be cut short by `cancel`.
        if let Err(_err) = self.limiter.release_blocking(&element, cancel) {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %_err, "release cancelled after dequeue");
        }
        Ok(element)
    }

    /// Wait at most `timeout` for the head. Nothing is released on timeout.
    pub fn dequeue_timeout(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<E>> {
        let element = self.store.poll_timeout(timeout, cancel)?;
        if let Some(element) = &element {
            self.limiter.release(element);
        }
        Ok(element)
    }

    pub fn try_dequeue(&self) -> Option<E> {
        let element = self.store.poll()?;
        self.limiter.release(&element);
        Some(element)
    }

    /// Remove the first element equal to `element`; budget is released only
    /// when something was actually removed.
    pub fn remove(&self, element: &E) -> bool
    where
        E: PartialEq,
    {
        let removed = self.store.remove(element);
        if removed {
            self.limiter.release(element);
        }
        removed
    }

    /// Pop everything currently queued, releasing each element's bytes.
    pub fn drain(&self) -> Vec<E> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(element) = self.try_dequeue() {
            out.push(element);
        }
        out
    }

    /// Empty the store, then reset the accounting.
    pub fn clear(&self) {
        self.store.clear();
        self.limiter.clear();
    }
}

impl<E, S: FifoStore<E>> fmt::Debug for MemoryBoundedQueue<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBoundedQueue")
            .field("len", &self.len())
            .field("limiter", &self.limiter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    /// Elements are their own size; counts every estimate.
    #[derive(Clone, Default)]
    struct CountingSize {
        calls: Arc<AtomicUsize>,
    }

    impl CountingSize {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SizeEstimator<usize> for CountingSize {
        fn estimate(&self, element: &usize) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *element
        }
    }

    fn queue(limit: usize) -> (Arc<MemoryBoundedQueue<usize>>, CountingSize) {
        let sizes = CountingSize::default();
        let q = MemoryBoundedQueue::with_limit(limit, sizes.clone()).unwrap();
        (Arc::new(q), sizes)
    }

    #[test]
    fn test_enqueue_dequeue_accounting() {
        let (q, _) = queue(100);
        let never = CancellationToken::never();

        q.enqueue(30, &never).unwrap();
        q.enqueue(20, &never).unwrap();
        assert_eq!(q.len(), 2);
        assert_eq!(q.limiter().current_usage(), 50);

        assert_eq!(q.dequeue(&never).unwrap(), 30);
        assert_eq!(q.limiter().current_usage(), 20);
        assert_eq!(q.try_dequeue(), Some(20));
        assert_eq!(q.limiter().current_usage(), 0);
    }

    #[test]
    fn test_try_enqueue_over_budget_returns_element() {
        let (q, _) = queue(100);
        q.try_enqueue(70).unwrap();

        let err = q.try_enqueue(30).unwrap_err();
        assert!(matches!(err, EnqueueError::Full(_)));
        assert_eq!(err.into_inner(), 30);
        assert_eq!(q.len(), 1);
        assert_eq!(q.limiter().current_usage(), 70);
    }

    #[test]
    fn test_enqueue_timeout_leaves_store_untouched() {
        let (q, _) = queue(100);
        q.try_enqueue(90).unwrap();

        let err = q
            .enqueue_timeout(20, Duration::from_millis(20), &CancellationToken::never())
            .unwrap_err();
        assert!(matches!(err, EnqueueError::Timeout(20)));
        assert_eq!(q.len(), 1);
        assert_eq!(q.limiter().current_usage(), 90);
    }

    #[test]
    fn test_empty_dequeue_never_releases() {
        let (q, sizes) = queue(100);
        assert_eq!(q.try_dequeue(), None);
        assert_eq!(
            q.dequeue_timeout(Duration::from_millis(10), &CancellationToken::never())
                .unwrap(),
            None
        );
        assert_eq!(sizes.calls(), 0);
    }

    #[test]
    fn test_remove_absent_never_releases() {
        let (q, sizes) = queue(100);
        q.try_enqueue(10).unwrap();
        let before = sizes.calls();

        assert!(!q.remove(&42));
        assert_eq!(sizes.calls(), before);
        assert_eq!(q.limiter().current_usage(), 10);

        assert!(q.remove(&10));
        assert_eq!(q.limiter().current_usage(), 0);
        assert!(q.is_empty());
    }

    #[test]
    fn test_cancelled_enqueue_is_invisible() {
        let (q, _) = queue(100);
        q.try_enqueue(60).unwrap();

        let token = CancellationToken::new();
        let (q2, t2) = (Arc::clone(&q), token.clone());
        let handle = thread::spawn(move || q2.enqueue(50, &t2));

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        let err = handle.join().unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.into_inner(), 50);
        assert_eq!(q.len(), 1);
        assert_eq!(q.limiter().current_usage(), 60);
    }

    #[test]
    fn test_blocked_producer_resumes_after_dequeue() {
        let (q, _) = queue(100);
        q.try_enqueue(60).unwrap();

        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.enqueue(50, &CancellationToken::never()));

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        assert_eq!(q.try_dequeue(), Some(60));
        handle.join().unwrap().unwrap();
        assert_eq!(q.drain(), vec![50]);
        assert_eq!(q.limiter().current_usage(), 0);
    }

    #[test]
    fn test_clear_empties_store_and_budget() {
        let (q, _) = queue(100);
        for v in [10, 20, 30] {
            q.try_enqueue(v).unwrap();
        }
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.limiter().current_usage(), 0);
        q.try_enqueue(90).unwrap();
    }

    #[test]
    fn test_dequeue_cancelled_while_empty() {
        let (q, sizes) = queue(100);
        let token = CancellationToken::new();
        token.cancel();
        assert!(q.dequeue(&token).is_err());
        assert_eq!(sizes.calls(), 0);
    }

    /// Hands out the head, then fires `token` as the element leaves.
    struct CancelOnTake {
        inner: LinkedStore<usize>,
        token: CancellationToken,
    }

    impl FifoStore<usize> for CancelOnTake {
        fn put(&self, element: usize) {
            self.inner.put(element);
        }

        fn take(&self, cancel: &CancellationToken) -> Result<usize> {
            let element = self.inner.take(cancel)?;
            self.token.cancel();
            Ok(element)
        }

        fn poll_timeout(
            &self,
            timeout: Duration,
            cancel: &CancellationToken,
        ) -> Result<Option<usize>> {
            self.inner.poll_timeout(timeout, cancel)
        }

        fn poll(&self) -> Option<usize> {
            self.inner.poll()
        }

        fn remove(&self, element: &usize) -> bool {
            self.inner.remove(element)
        }

        fn clear(&self) {
            self.inner.clear();
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    #[test]
    fn test_dequeue_cancelled_after_take_still_releases() {
        let token = CancellationToken::new();
        let store = CancelOnTake {
            inner: LinkedStore::new(),
            token: token.clone(),
        };
        let limiter = MemoryLimiter::new(100, |n: &usize| *n).unwrap();
        let q = MemoryBoundedQueue::new(store, limiter);

        q.enqueue(60, &CancellationToken::never()).unwrap();
        assert_eq!(q.dequeue(&token).unwrap(), 60);
        assert!(token.is_cancelled());
        assert!(q.is_empty());
        assert_eq!(q.limiter().current_usage(), 0);

        q.try_enqueue(90).unwrap();
    }
}
