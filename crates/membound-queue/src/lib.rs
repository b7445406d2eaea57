#![forbid(unsafe_code)]
//! membound-queue: a FIFO whose admission is bounded by estimated bytes.
//!
//! `MemoryBoundedQueue` decorates a [`FifoStore`] so every enqueue first
//! acquires budget from its `MemoryLimiter` and every dequeue gives it back.
//! Item order belongs to the store; the limiter only does the accounting.

pub mod queue;
pub mod store;

pub use queue::{EnqueueError, MemoryBoundedQueue};
pub use store::{FifoStore, LinkedStore};
