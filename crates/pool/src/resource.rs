//! The `Resource` trait: how payloads are built and reset.
//!
//! A pool calls [`Resource::create`] once per slot at construction time, then
//! runs [`Resource::on_checkout`] / [`Resource::on_checkin`] every time a
//! payload changes hands. Both hooks run while the caller exclusively owns the
//! payload, so they need no synchronization of their own.

use std::future::Future;

use crate::error::Result;

/// Core resource trait.
///
/// Defines how to build an expensive payload and how to stamp / clean
/// per-use state on it.
pub trait Resource: Send + Sync + 'static {
    /// The expensive-to-build value kept in the pool.
    type Payload: Send + 'static;

    /// Build the payload for `identity`.
    ///
    /// Called sequentially, exactly once per pool slot. Any error aborts pool
    /// construction.
    fn create(&self, identity: &str) -> impl Future<Output = Result<Self::Payload>> + Send;

    /// Prepare a payload for the caller that checked it out under `label`.
    fn on_checkout(&self, _payload: &mut Self::Payload, _label: &str) -> Result<()> {
        Ok(())
    }

    /// Clear any per-use state before the payload goes back to the pool.
    fn on_checkin(&self, _payload: &mut Self::Payload) -> Result<()> {
        Ok(())
    }
}

/// [`Resource`] built from a plain factory closure, with no-op hooks.
///
/// Used by [`Pool::from_fn`](crate::Pool::from_fn).
pub struct FnResource<F> {
    factory: F,
}

impl<F> FnResource<F> {
    /// Wrap a factory closure.
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F, T> Resource for FnResource<F>
where
    F: Fn(&str) -> Result<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Payload = T;

    fn create(&self, identity: &str) -> impl Future<Output = Result<T>> + Send {
        std::future::ready((self.factory)(identity))
    }
}

impl<F> std::fmt::Debug for FnResource<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnResource").finish_non_exhaustive()
    }
}
