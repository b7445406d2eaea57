//! Convenient re-exports for downstream crates.

pub use crate::cancel::{CancellationToken, WakerRegistration};
pub use crate::config::QueueConfig;
pub use crate::error::{Error, Result};
pub use crate::estimate::{ByteLen, FixedSize, ShallowSize, SizeEstimator};
