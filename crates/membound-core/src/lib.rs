#![forbid(unsafe_code)]
//! membound-core: shared vocabulary for the memory-bounded queue.
//!
//! Holds the pieces both the limiter and the queue crates depend on:
//! the error type, the queue configuration, the `SizeEstimator` seam, and
//! the `CancellationToken` that stands in for thread interruption.

pub mod cancel;
pub mod config;
pub mod error;
pub mod estimate;
pub mod prelude;

pub use cancel::CancellationToken;
pub use config::QueueConfig;
pub use error::{Error, Result};
pub use estimate::SizeEstimator;
