#![forbid(unsafe_code)]
//! membound-mem: byte-budget admission control.
//!
//! `MemoryLimiter` is the concurrency primitive behind the bounded queue. It
//! keeps one admission path and one reclamation path, each with its own lock
//! and condition variable, so producers and consumers do not contend with
//! each other on a single lock.

pub mod limiter;
pub mod tracking;

pub use limiter::MemoryLimiter;
pub use tracking::PeakTracker;
