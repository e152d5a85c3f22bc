//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Order in which idle resources are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Strategy {
    /// Most recently released first - keeps one resource warm
    #[default]
    Lifo,
    /// Least recently released first - spreads use across all resources
    Fifo,
}

/// Configuration for a fixed-size pool
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Pool name used in logs, events and errors
    pub name: String,
    /// Number of resources built at construction. Zero yields a pool that
    /// is permanently exhausted.
    pub capacity: usize,
    /// Timeout used by [`Pool::acquire_default`](crate::Pool::acquire_default)
    pub acquire_timeout: Duration,
    /// Order in which idle resources are handed out
    pub strategy: Strategy,
    /// Identities are `"{identity_prefix} {n}"` for `n` in `1..=capacity`
    pub identity_prefix: String,
    /// Buffer size of the lifecycle event channel
    pub event_buffer: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            capacity: 4,
            acquire_timeout: Duration::from_secs(10),
            strategy: Strategy::default(),
            identity_prefix: "instance".to_string(),
            event_buffer: 256,
        }
    }
}

impl PoolConfig {
    /// Default configuration with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::configuration("name must not be empty"));
        }
        if self.identity_prefix.is_empty() {
            return Err(Error::configuration("identity_prefix must not be empty"));
        }
        if self.event_buffer == 0 {
            return Err(Error::configuration("event_buffer must be greater than 0"));
        }
        Ok(())
    }

    /// Identity assigned to the `n`th resource (1-based).
    pub(crate) fn identity(&self, n: usize) -> String {
        format!("{} {n}", self.identity_prefix)
    }
}
