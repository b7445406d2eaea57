#![forbid(unsafe_code)]
//! membound: a blocking FIFO queue bounded by estimated bytes, not length.
//!
//! ```
//! use membound::prelude::*;
//!
//! let queue = MemoryBoundedQueue::with_limit(1024, ByteLen).unwrap();
//! queue.try_enqueue(vec![0u8; 600]).unwrap();
//! assert!(queue.try_enqueue(vec![0u8; 600]).is_err());
//!
//! let never = CancellationToken::never();
//! assert_eq!(queue.dequeue(&never).unwrap().len(), 600);
//! assert_eq!(queue.limiter().current_usage(), 0);
//! ```

pub use membound_core::{CancellationToken, Error, QueueConfig, Result, SizeEstimator};
pub use membound_mem::MemoryLimiter;
pub use membound_queue::{EnqueueError, MemoryBoundedQueue};

pub mod prelude {
    pub use membound_core::prelude::*;
    pub use membound_mem::{MemoryLimiter, PeakTracker};
    pub use membound_queue::{EnqueueError, FifoStore, LinkedStore, MemoryBoundedQueue};
}
