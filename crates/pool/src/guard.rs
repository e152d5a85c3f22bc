//! RAII handle for a checked-out resource

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::entry::PooledResource;
use crate::pool::Shared;
use crate::resource::Resource;

/// A resource checked out of a [`Pool`](crate::Pool).
///
/// Derefs to the payload. Dropping the handle runs the checkin hook and
/// returns the resource to its pool; [`Pool::release`](crate::Pool::release)
/// does the same but reports hook failures to the caller.
///
/// The handle keeps the pool's shared state alive, so it stays valid even if
/// every `Pool` clone is dropped first.
pub struct Checkout<R: Resource> {
    entry: Option<PooledResource<R::Payload>>,
    shared: Arc<Shared<R>>,
}

impl<R: Resource> Checkout<R> {
    pub(crate) fn new(shared: Arc<Shared<R>>, entry: PooledResource<R::Payload>) -> Self {
        Self {
            entry: Some(entry),
            shared,
        }
    }

    fn entry(&self) -> &PooledResource<R::Payload> {
        self.entry.as_ref().expect("checkout used after release")
    }

    /// Permanent identity of the resource.
    pub fn identity(&self) -> &str {
        self.entry().identity()
    }

    /// Label this resource was checked out under.
    pub fn label(&self) -> &str {
        self.entry().label()
    }

    /// How many times this resource has been checked out, this time included.
    pub fn checkouts(&self) -> u64 {
        self.entry().checkouts()
    }

    /// Time since this checkout started.
    pub fn held_for(&self) -> Duration {
        self.entry()
            .checked_out_at()
            .map(|at| at.elapsed())
            .unwrap_or_default()
    }

    /// Id of the pool this handle came from.
    pub fn pool_id(&self) -> Uuid {
        self.shared.id()
    }

    pub(crate) fn belongs_to(&self, pool: Uuid) -> bool {
        self.shared.id() == pool
    }

    /// Return the resource, surfacing any checkin hook failure.
    pub(crate) fn check_in(mut self) -> crate::Result<()> {
        match self.entry.take() {
            Some(entry) => self.shared.check_in(entry),
            None => Ok(()),
        }
    }
}

impl<R: Resource> std::ops::Deref for Checkout<R> {
    type Target = R::Payload;

    fn deref(&self) -> &R::Payload {
        self.entry().payload()
    }
}

impl<R: Resource> std::ops::DerefMut for Checkout<R> {
    fn deref_mut(&mut self) -> &mut R::Payload {
        self.entry
            .as_mut()
            .expect("checkout used after release")
            .payload_mut()
    }
}

impl<R: Resource> Drop for Checkout<R> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            // hook failures are already logged and broadcast by check_in
            let _ = self.shared.check_in(entry);
        }
    }
}

impl<R> std::fmt::Debug for Checkout<R>
where
    R: Resource,
    R::Payload: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkout")
            .field("pool", &self.shared.id())
            .field("entry", &self.entry)
            .finish()
    }
}
