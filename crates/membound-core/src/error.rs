use thiserror::Error;

/// Canonical result for membound.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by the limiter and the queue.
///
/// Budget exhaustion and timeouts are *not* errors: they surface as `false`,
/// `None`, or the element handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("memory limit must be greater than zero (got {0})")]
    InvalidLimit(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("blocking operation cancelled")]
    Cancelled,
}
