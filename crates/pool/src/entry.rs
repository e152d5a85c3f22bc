//! A payload plus the bookkeeping the pool keeps about it.

use std::time::Instant;

/// One slot of a pool.
///
/// While idle, `label == identity` and `in_use == false`. A checkout stamps
/// the caller's label; a checkin restores the identity.
#[derive(Debug)]
pub struct PooledResource<T> {
    identity: String,
    label: String,
    in_use: bool,
    checkouts: u64,
    checked_out_at: Option<Instant>,
    payload: T,
}

impl<T> PooledResource<T> {
    pub fn new(identity: String, payload: T) -> Self {
        Self {
            label: identity.clone(),
            identity,
            in_use: false,
            checkouts: 0,
            checked_out_at: None,
            payload,
        }
    }

    /// Permanent label assigned at construction.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Current label: the checkout label while in use, the identity while idle.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the resource is currently checked out.
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// How many times this resource has been checked out.
    pub fn checkouts(&self) -> u64 {
        self.checkouts
    }

    /// When the current checkout started, if in use.
    pub fn checked_out_at(&self) -> Option<Instant> {
        self.checked_out_at
    }

    /// Shared access to the payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Exclusive access to the payload.
    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }

    /// Idle -> InUse.
    pub fn check_out(&mut self, label: &str) {
        debug_assert!(!self.in_use, "checkout of a resource already in use");
        label.clone_into(&mut self.label);
        self.in_use = true;
        self.checkouts += 1;
        self.checked_out_at = Some(Instant::now());
    }

    /// InUse -> Idle.
    pub fn check_in(&mut self) {
        self.identity.clone_into(&mut self.label);
        self.in_use = false;
        self.checked_out_at = None;
    }
}
