//! Two-lock memory limiter.
//!
//! Admission (`acquire*`) and reclamation (`release*`) each own a lock and a
//! condition variable:
//!
//! - admission waiters park on `space_available` while `used + size >= limit`;
//! - reclamation waiters park on `bytes_held` while `used == 0`.
//!
//! `used` is a single atomic counter. Its check-then-commit always runs under
//! the lock of the path doing the update, and the opposite path can only move
//! it in the direction that keeps that check valid (a release only makes room,
//! an admission only adds held bytes). `clear` is the one operation that needs
//! both locks; it takes admission first, then reclamation.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use membound_core::cancel::{CancellationToken, WakerRegistration};
use membound_core::config::QueueConfig;
use membound_core::error::{Error, Result};
use membound_core::estimate::SizeEstimator;

use crate::tracking::PeakTracker;

/// One side of the limiter: the lock serializing that side's updates of
/// `used`, and the condition its waiters park on.
#[derive(Default)]
struct Gate {
    lock: Mutex<()>,
    cond: Condvar,
}

impl Gate {
    /// Wake every waiter on this side. The lock is taken first so a waiter
    /// that has checked its predicate is either parked or will re-check.
    fn wake_all(&self) {
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }

    fn register(self: &Arc<Self>, cancel: &CancellationToken) -> WakerRegistration {
        let gate = Arc::clone(self);
        cancel.register(move || gate.wake_all())
    }

    /// Park until woken. Returns false without parking once `deadline` passed.
    fn park(&self, guard: &mut MutexGuard<'_, ()>, deadline: Option<Instant>) -> bool {
        match deadline {
            None => {
                self.cond.wait(guard);
                true
            }
            Some(deadline) => {
                if Instant::now() >= deadline {
                    return false;
                }
                self.cond.wait_until(guard, deadline);
                true
            }
        }
    }
}

fn deadline_after(timeout: Duration) -> Option<Instant> {
    // An unrepresentable deadline waits forever.
    Instant::now().checked_add(timeout)
}

/// Byte-budget admission control for elements of type `E`.
///
/// Sizes come from the injected [`SizeEstimator`]; the estimator is asked
/// once per acquire and once per release of the same element.
pub struct MemoryLimiter<E> {
    limit: AtomicUsize,
    used: AtomicUsize,
    /// `space_available`: signaled when `used` drops.
    admission: Arc<Gate>,
    /// `bytes_held`: signaled when `used` leaves zero.
    reclamation: Arc<Gate>,
    estimator: Arc<dyn SizeEstimator<E>>,
    peak: Option<PeakTracker>,
}

impl<E> MemoryLimiter<E> {
    pub fn new<S>(limit: usize, estimator: S) -> Result<Self>
    where
        S: SizeEstimator<E> + 'static,
    {
        Self::with_shared_estimator(limit, Arc::new(estimator))
    }

    /// Build a limiter around an estimator shared with other limiters.
    pub fn with_shared_estimator(
        limit: usize,
        estimator: Arc<dyn SizeEstimator<E>>,
    ) -> Result<Self> {
        if limit == 0 {
            return Err(Error::InvalidLimit(limit));
        }
        Ok(Self {
            limit: AtomicUsize::new(limit),
            used: AtomicUsize::new(0),
            admission: Arc::new(Gate::default()),
            reclamation: Arc::new(Gate::default()),
            estimator,
            peak: Some(PeakTracker::new()),
        })
    }

    pub fn from_config<S>(cfg: &QueueConfig, estimator: S) -> Result<Self>
    where
        S: SizeEstimator<E> + 'static,
    {
        cfg.validate()?;
        let mut limiter = Self::new(cfg.memory_limit_bytes, estimator)?;
        if !cfg.track_peak {
            limiter.peak = None;
        }
        Ok(limiter)
    }

    /// Estimated footprint of `element`.
    pub fn size_of(&self, element: &E) -> usize {
        self.estimator.estimate(element)
    }

    // ----- admission -----

    /// Admit `element` if it fits right now. Never waits.
    pub fn try_acquire(&self, element: &E) -> bool {
        let bytes = self.size_of(element);
        let admitted = {
            let _guard = self.admission.lock.lock();
            self.admit(bytes)
        };
        match admitted {
            Some(prev) => {
                self.after_admit(prev, bytes);
                true
            }
            None => false,
        }
    }

    /// Wait until `element` fits, then admit it.
    ///
    /// Returns `Error::Cancelled` without admitting if `cancel` fires first.
    pub fn acquire(&self, element: &E, cancel: &CancellationToken) -> Result<()> {
        self.acquire_until(element, None, cancel).map(|_| ())
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`,
    /// returning `Ok(false)` with nothing admitted.
    pub fn acquire_timeout(
        &self,
        element: &E,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        self.acquire_until(element, deadline_after(timeout), cancel)
    }

    fn acquire_until(
        &self,
        element: &E,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let bytes = self.size_of(element);
        let _registration = self.admission.register(cancel);
        let prev = {
            let mut guard = self.admission.lock.lock();
            loop {
                if cancel.is_cancelled() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(bytes, "admission wait cancelled");
                    return Err(Error::Cancelled);
                }
                if let Some(prev) = self.admit(bytes) {
                    break prev;
                }
                if !self.admission.park(&mut guard, deadline) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(bytes, "admission wait timed out");
                    return Ok(false);
                }
            }
        };
        self.after_admit(prev, bytes);
        Ok(true)
    }

    /// Check-then-commit under the admission lock. Returns `used` before the
    /// commit on success.
    fn admit(&self, bytes: usize) -> Option<usize> {
        let used = self.used.load(Ordering::Acquire);
        let limit = self.limit.load(Ordering::Acquire);
        if used.saturating_add(bytes) >= limit {
            return None;
        }
        let prev = self.used.fetch_add(bytes, Ordering::AcqRel);
        let now = prev + bytes;
        if now < limit {
            // Pass the wakeup on to the next admission waiter.
            self.admission.cond.notify_one();
        }
        if let Some(peak) = &self.peak {
            peak.record_used(now);
        }
        Some(prev)
    }

    fn after_admit(&self, prev: usize, bytes: usize) {
        #[cfg(feature = "tracing")]
        tracing::trace!(bytes, used = prev + bytes, "admitted");
        if prev == 0 && bytes > 0 {
            self.reclamation.wake_all();
        }
    }

    // ----- reclamation -----

    /// Return the bytes of `element`. No-op while nothing is held.
    pub fn release(&self, element: &E) {
        let bytes = self.size_of(element);
        let freed = {
            let _guard = self.reclamation.lock.lock();
            self.reclaim(bytes)
        };
        if let Some(freed) = freed {
            self.after_reclaim(freed);
        }
    }

    /// Wait until some bytes are held, then return the bytes of `element`.
    ///
    /// A zero-sized element has nothing to give back and returns at once.
    /// Cancellation only ends the wait: if bytes are held when the call runs,
    /// they are released even through a cancelled token.
    pub fn release_blocking(&self, element: &E, cancel: &CancellationToken) -> Result<()> {
        self.release_until(element, None, cancel).map(|_| ())
    }

    /// Like [`release_blocking`](Self::release_blocking) but gives up after
    /// `timeout`, returning `Ok(false)` with no effect.
    pub fn release_timeout(
        &self,
        element: &E,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        self.release_until(element, deadline_after(timeout), cancel)
    }

    fn release_until(
        &self,
        element: &E,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let bytes = self.size_of(element);
        if bytes == 0 {
            return Ok(true);
        }
        let _registration = self.reclamation.register(cancel);
        let freed = {
            let mut guard = self.reclamation.lock.lock();
            loop {
                // Reclaim before honoring cancellation: held bytes are always
                // given back, only the wait itself is cancellable.
                if let Some(freed) = self.reclaim(bytes) {
                    break freed;
                }
                if cancel.is_cancelled() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(bytes, "release wait cancelled");
                    return Err(Error::Cancelled);
                }
                if !self.reclamation.park(&mut guard, deadline) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(bytes, "release wait timed out");
                    return Ok(false);
                }
            }
        };
        self.after_reclaim(freed);
        Ok(true)
    }

    /// Subtract under the reclamation lock, saturating at zero. Returns the
    /// bytes actually freed, or `None` when nothing was held.
    fn reclaim(&self, bytes: usize) -> Option<usize> {
        if self.used.load(Ordering::Acquire) == 0 {
            return None;
        }
        let prev = match self.used.fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
            Some(used.saturating_sub(bytes))
        }) {
            Ok(prev) | Err(prev) => prev,
        };
        let now = prev.saturating_sub(bytes);
        if now > 0 {
            // Bytes are still held: let the next release waiter through.
            self.reclamation.cond.notify_one();
        }
        Some(prev - now)
    }

    fn after_reclaim(&self, freed: usize) {
        #[cfg(feature = "tracing")]
        tracing::trace!(freed, used = self.current_usage(), "released");
        if freed > 0 {
            self.admission.wake_all();
        }
    }

    // ----- limit and state -----

    /// Change the budget. Applies to the next admission check; admitted bytes
    /// are never evicted.
    pub fn set_limit(&self, limit: usize) -> Result<()> {
        if limit == 0 {
            return Err(Error::InvalidLimit(limit));
        }
        let _guard = self.admission.lock.lock();
        let old = self.limit.swap(limit, Ordering::AcqRel);
        #[cfg(feature = "tracing")]
        tracing::trace!(old, new = limit, "limit changed");
        if limit > old {
            self.admission.cond.notify_all();
        }
        Ok(())
    }

    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::Acquire)
    }

    /// Currently admitted bytes (advisory).
    pub fn current_usage(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Bytes left before the limit (advisory).
    pub fn remaining(&self) -> usize {
        self.limit().saturating_sub(self.current_usage())
    }

    /// High-water mark of admitted bytes, if peak tracking is on.
    pub fn peak_usage(&self) -> Option<usize> {
        self.peak.as_ref().map(PeakTracker::peak)
    }

    pub fn reset_peak(&self) {
        if let Some(peak) = &self.peak {
            peak.reset();
        }
    }

    /// Forget every admitted byte and wake admission waiters.
    pub fn clear(&self) {
        let _admission = self.admission.lock.lock();
        let _reclamation = self.reclamation.lock.lock();
        let prev = self.used.swap(0, Ordering::AcqRel);
        #[cfg(feature = "tracing")]
        tracing::trace!(dropped = prev, "limiter cleared");
        if prev > 0 {
            self.admission.cond.notify_all();
        }
    }
}

impl<E> fmt::Debug for MemoryLimiter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLimiter")
            .field("limit", &self.limit())
            .field("used", &self.current_usage())
            .field("peak", &self.peak_usage())
            .finish()
    }
}
