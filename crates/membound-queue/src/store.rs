//! Underlying FIFO storage for the bounded queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use membound_core::cancel::{CancellationToken, WakerRegistration};
use membound_core::error::{Error, Result};

/// Abstract thread-safe, unbounded FIFO.
///
/// Implemented by [`LinkedStore`]. The queue decorator owns all byte
/// accounting, so stores never look at element sizes.
pub trait FifoStore<E>: Send + Sync {
    /// Append to the tail.
    fn put(&self, element: E);

    /// Append without waiting. Unbounded stores always accept.
    fn offer(&self, element: E) -> std::result::Result<(), E> {
        self.put(element);
        Ok(())
    }

    /// Remove the head, waiting for one to arrive.
    fn take(&self, cancel: &CancellationToken) -> Result<E>;

    /// Remove the head, waiting at most `timeout`. `Ok(None)` on timeout.
    fn poll_timeout(&self, timeout: Duration, cancel: &CancellationToken) -> Result<Option<E>>;

    /// Remove the head if there is one.
    fn poll(&self) -> Option<E>;

    /// Remove the first element equal to `element`.
    fn remove(&self, element: &E) -> bool
    where
        E: PartialEq;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct StoreInner<E> {
    items: Mutex<VecDeque<E>>,
    not_empty: Condvar,
}

/// Linked FIFO behind a single lock and a `not_empty` condition.
///
/// Clones share the same underlying storage.
pub struct LinkedStore<E> {
    inner: Arc<StoreInner<E>>,
}

impl<E> LinkedStore<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                items: Mutex::new(VecDeque::new()),
                not_empty: Condvar::new(),
            }),
        }
    }
}

impl<E: Send + 'static> LinkedStore<E> {
    fn register(&self, cancel: &CancellationToken) -> WakerRegistration {
        let inner = Arc::clone(&self.inner);
        cancel.register(move || {
            let _items = inner.items.lock();
            inner.not_empty.notify_all();
        })
    }

    /// Pop the head, parking until one arrives, `deadline` passes, or
    /// `cancel` fires.
    fn pop_until(
        &self,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<Option<E>> {
        let _registration = self.register(cancel);
        let mut items = self.inner.items.lock();
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Some(element) = items.pop_front() {
                if !items.is_empty() {
                    self.inner.not_empty.notify_one();
                }
                return Ok(Some(element));
            }
            match deadline {
                None => self.inner.not_empty.wait(&mut items),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    self.inner.not_empty.wait_until(&mut items, deadline);
                }
            }
        }
    }
}

impl<E> Clone for LinkedStore<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for LinkedStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Send + 'static> FifoStore<E> for LinkedStore<E> {
    fn put(&self, element: E) {
        let mut items = self.inner.items.lock();
        items.push_back(element);
        self.inner.not_empty.notify_one();
    }

    fn take(&self, cancel: &CancellationToken) -> Result<E> {
        loop {
            if let Some(element) = self.pop_until(None, cancel)? {
                return Ok(element);
            }
        }
    }

    fn poll_timeout(&self, timeout: Duration, cancel: &CancellationToken) -> Result<Option<E>> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.pop_until(Some(deadline), cancel),
            None => self.take(cancel).map(Some),
        }
    }

    fn poll(&self) -> Option<E> {
        self.inner.items.lock().pop_front()
    }

    fn remove(&self, element: &E) -> bool
    where
        E: PartialEq,
    {
        let mut items = self.inner.items.lock();
        match items.iter().position(|e| e == element) {
            Some(idx) => {
                items.remove(idx);
                true
            }
            None => false,
        }
    }

    fn clear(&self) {
        self.inner.items.lock().clear();
    }

    fn len(&self) -> usize {
        self.inner.items.lock().len()
    }
}
