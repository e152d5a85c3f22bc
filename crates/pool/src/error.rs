//! Error types for pool construction, checkout and checkin
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle hook that produced an [`Error::Hook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// `Resource::on_checkout`, run while handing a resource to a caller.
    Checkout,
    /// `Resource::on_checkin`, run while returning a resource to the pool.
    Checkin,
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checkout => write!(f, "checkout"),
            Self::Checkin => write!(f, "checkin"),
        }
    }
}

/// Error type for every pool operation
#[derive(Error, Debug)]
pub enum Error {
    /// Pool configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// A factory could not build a payload.
    ///
    /// Returned by [`Resource::create`](crate::Resource::create) implementations.
    #[error("Initialization failed for '{identity}': {reason}")]
    Initialization {
        /// Identity the payload was being built for
        identity: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Building the fixed set of resources failed; no pool exists.
    #[error("Pool '{pool}' construction failed at '{identity}' ({built}/{capacity} built)")]
    Construction {
        /// Pool name
        pool: String,
        /// Identity whose factory call failed
        identity: String,
        /// Resources successfully built before the failure
        built: usize,
        /// Requested capacity
        capacity: usize,
        /// The factory error
        #[source]
        source: Box<Error>,
    },

    /// No resource became available within the timeout
    #[error("Pool '{pool}' exhausted: {capacity} in use, {waiters} waiting, gave up after {timeout:?}")]
    Exhausted {
        /// Pool name
        pool: String,
        /// Pool capacity
        capacity: usize,
        /// Callers still waiting when this one gave up
        waiters: usize,
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// The caller's cancellation token fired while waiting
    #[error("Acquire from pool '{pool}' was cancelled")]
    Cancelled {
        /// Pool name
        pool: String,
    },

    /// A handle was released into a pool it was not checked out from
    #[error("Handle for '{identity}' belongs to pool {owner}, not {pool}")]
    Misuse {
        /// The pool `release` was called on
        pool: Uuid,
        /// The pool the handle came from
        owner: Uuid,
        /// Identity of the released resource
        identity: String,
    },

    /// A hook panicked instead of returning
    #[error("Panicked: {message}")]
    Panicked {
        /// The panic message, if it was a string
        message: String,
    },

    /// A checkout or checkin hook failed
    #[error("{phase} hook failed for '{identity}'")]
    Hook {
        /// Which hook failed
        phase: HookPhase,
        /// Identity of the affected resource
        identity: String,
        /// The hook error
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an initialization error for a factory that failed to build `identity`
    pub fn initialization(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Initialization {
            identity: identity.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Attach an underlying cause to an [`Error::Initialization`].
    ///
    /// Other variants are returned unchanged.
    #[must_use]
    pub fn with_source<E>(self, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match self {
            Self::Initialization {
                identity, reason, ..
            } => Self::Initialization {
                identity,
                reason,
                source: Some(Box::new(err)),
            },
            other => other,
        }
    }

    /// Turn a caught panic payload into an [`Error::Panicked`].
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::Panicked { message }
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::Cancelled { .. })
    }

    /// Identity of the resource involved in this error (if any)
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Configuration { .. }
            | Self::Exhausted { .. }
            | Self::Cancelled { .. }
            | Self::Panicked { .. } => None,
            Self::Initialization { identity, .. }
            | Self::Construction { identity, .. }
            | Self::Misuse { identity, .. }
            | Self::Hook { identity, .. } => Some(identity),
        }
    }
}
