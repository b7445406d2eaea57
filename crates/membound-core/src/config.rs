//! Queue configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Historical default budget: the largest signed 32-bit value, in bytes.
pub const DEFAULT_MEMORY_LIMIT_BYTES: usize = i32::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Byte budget. Admitted elements may never reach this value.
    pub memory_limit_bytes: usize,

    /// Record the high-water mark of admitted bytes.
    pub track_peak: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            track_peak: true,
        }
    }
}

impl QueueConfig {
    pub fn with_limit(memory_limit_bytes: usize) -> Self {
        Self {
            memory_limit_bytes,
            ..Self::default()
        }
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `MEMBOUND_MEMORY_LIMIT_BYTES`: byte budget
    /// - `MEMBOUND_TRACK_PEAK`: `true`/`false`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(s) = lookup("MEMBOUND_MEMORY_LIMIT_BYTES") {
            if let Ok(v) = s.trim().parse::<usize>() {
                cfg.memory_limit_bytes = v;
            }
        }

        if let Some(s) = lookup("MEMBOUND_TRACK_PEAK") {
            if let Ok(v) = s.trim().parse::<bool>() {
                cfg.track_peak = v;
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory_limit_bytes == 0 {
            return Err(Error::InvalidConfig(
                "memory_limit_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
