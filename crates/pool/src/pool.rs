//! Fixed-size resource pool.
//!
//! All resources are built up front by [`Pool::new`]. Callers check them out
//! with [`Pool::acquire`] and give them back with [`Pool::release`] (or by
//! dropping the [`Checkout`]). When nothing is idle, acquirers queue in FIFO
//! order and a release hands its resource straight to the oldest waiter.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{PoolConfig, Strategy};
use crate::entry::PooledResource;
use crate::error::{Error, HookPhase, Result};
use crate::events::{EventBus, PoolEvent};
use crate::guard::Checkout;
use crate::resource::{FnResource, Resource};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Point-in-time pool statistics.
///
/// `available + checked_out == capacity` in every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Fixed number of resources.
    pub capacity: usize,
    /// Resources idle in the pool.
    pub available: usize,
    /// Resources held by callers (including ones in hand-off to a waiter).
    pub checked_out: usize,
    /// Callers currently blocked in `acquire`.
    pub waiters: usize,
    /// Successful checkouts.
    pub total_acquisitions: u64,
    /// Checkins.
    pub total_releases: u64,
    /// Acquires that gave up on timeout.
    pub total_timeouts: u64,
    /// Checkout or checkin hook failures.
    pub total_hook_failures: u64,
}

/// Idle resource as seen by [`Pool::idle_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot {
    /// Permanent identity.
    pub identity: String,
    /// Current label.
    pub label: String,
    /// In-use flag.
    pub in_use: bool,
    /// Lifetime checkout count.
    pub checkouts: u64,
}

#[derive(Default)]
struct Counters {
    acquisitions: AtomicU64,
    releases: AtomicU64,
    timeouts: AtomicU64,
    hook_failures: AtomicU64,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

type Entry<R> = PooledResource<<R as Resource>::Payload>;

/// Everything guarded by the pool lock.
struct State<T> {
    idle: VecDeque<PooledResource<T>>,
    waiters: VecDeque<oneshot::Sender<PooledResource<T>>>,
    checked_out: usize,
}

impl<T> State<T> {
    fn take_idle(&mut self, strategy: Strategy) -> Option<PooledResource<T>> {
        let entry = match strategy {
            Strategy::Lifo => self.idle.pop_back(),
            Strategy::Fifo => self.idle.pop_front(),
        }?;
        self.checked_out += 1;
        Some(entry)
    }

    fn live_waiters(&self) -> usize {
        self.waiters.iter().filter(|tx| !tx.is_closed()).count()
    }
}

pub(crate) struct Shared<R: Resource> {
    id: Uuid,
    resource: R,
    config: PoolConfig,
    state: Mutex<State<R::Payload>>,
    counters: Counters,
    events: Arc<EventBus>,
}

/// Outcome of registering as a waiter.
enum Take<'a, R: Resource> {
    Ready(Entry<R>),
    Wait(Waiting<'a, R>),
}

/// Why a waiter stopped waiting without a delivery.
enum GaveUp {
    TimedOut,
    Cancelled,
}

impl<R: Resource> Shared<R> {
    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    /// Pop an idle resource, or join the back of the waiter queue.
    fn take_or_wait(&self) -> Take<'_, R> {
        let mut state = self.state.lock();
        if let Some(entry) = state.take_idle(self.config.strategy) {
            return Take::Ready(entry);
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        Take::Wait(Waiting {
            shared: self,
            rx: Some(rx),
        })
    }

    /// Give an idle-state resource to the oldest live waiter, or park it.
    fn put_back(&self, entry: Entry<R>) {
        let mut state = self.state.lock();
        let mut entry = entry;
        while let Some(tx) = state.waiters.pop_front() {
            match tx.send(entry) {
                // stays counted as checked out, now on behalf of the waiter
                Ok(()) => return,
                // waiter gave up; try the next one
                Err(returned) => entry = returned,
            }
        }
        state.checked_out -= 1;
        state.idle.push_back(entry);
    }

    fn prune_waiters(&self) {
        self.state.lock().waiters.retain(|tx| !tx.is_closed());
    }

    /// Stamp `label` on a freshly taken resource and wrap it in a handle.
    fn hand_out(
        self: &Arc<Self>,
        mut entry: Entry<R>,
        label: &str,
        started: Instant,
    ) -> Result<Checkout<R>> {
        entry.check_out(label);
        let hook = run_hook(|| self.resource.on_checkout(entry.payload_mut(), label));
        if let Err(source) = hook {
            let identity = entry.identity().to_owned();
            self.hook_failed(&identity, HookPhase::Checkout, &source);
            entry.check_in();
            self.put_back(entry);
            return Err(Error::Hook {
                phase: HookPhase::Checkout,
                identity,
                source: Box::new(source),
            });
        }

        self.counters.acquisitions.fetch_add(1, Ordering::Relaxed);
        let waited = started.elapsed();
        tracing::debug!(
            pool = %self.name(),
            identity = %entry.identity(),
            label,
            waited_ms = waited.as_millis() as u64,
            "Checking out pool instance"
        );
        self.events.emit(PoolEvent::Acquired {
            pool: self.config.name.clone(),
            identity: entry.identity().to_owned(),
            label: label.to_owned(),
            waited,
        });
        Ok(Checkout::new(Arc::clone(self), entry))
    }

    /// Run the checkin hook, reset the label and make the resource available.
    ///
    /// The resource goes back even when the hook fails or panics.
    pub(crate) fn check_in(&self, mut entry: Entry<R>) -> Result<()> {
        let held = entry
            .checked_out_at()
            .map(|at| at.elapsed())
            .unwrap_or_default();
        let hook = run_hook(|| self.resource.on_checkin(entry.payload_mut()));
        let identity = entry.identity().to_owned();
        tracing::debug!(
            pool = %self.name(),
            identity = %identity,
            label = %entry.label(),
            held_ms = held.as_millis() as u64,
            "Checking in pool instance"
        );
        entry.check_in();
        // announced before a waiter can see it
        self.counters.releases.fetch_add(1, Ordering::Relaxed);
        self.events.emit(PoolEvent::Released {
            pool: self.config.name.clone(),
            identity: identity.clone(),
            held,
        });
        self.put_back(entry);

        hook.map_err(|source| {
            self.hook_failed(&identity, HookPhase::Checkin, &source);
            Error::Hook {
                phase: HookPhase::Checkin,
                identity,
                source: Box::new(source),
            }
        })
    }

    fn hook_failed(&self, identity: &str, phase: HookPhase, error: &Error) {
        self.counters.hook_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            pool = %self.name(),
            identity,
            %phase,
            error = %error,
            "Pool hook failed"
        );
        self.events.emit(PoolEvent::HookFailed {
            pool: self.config.name.clone(),
            identity: identity.to_owned(),
            phase,
            error: error.to_string(),
        });
    }

    fn exhausted(&self, timeout: Duration) -> Error {
        self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
        let waiters = self.state.lock().live_waiters();
        tracing::warn!(
            pool = %self.name(),
            capacity = self.config.capacity,
            waiters,
            timeout_ms = timeout.as_millis() as u64,
            "Pool exhausted"
        );
        self.events.emit(PoolEvent::Exhausted {
            pool: self.config.name.clone(),
            waiters,
            timeout,
        });
        Error::Exhausted {
            pool: self.config.name.clone(),
            capacity: self.config.capacity,
            waiters,
            timeout,
        }
    }
}

/// Run a lifecycle hook, reporting a panic as an error.
///
/// The caller owns the entry across the call, so a failed hook never
/// costs the pool a resource.
fn run_hook(hook: impl FnOnce() -> Result<()>) -> Result<()> {
    std::panic::catch_unwind(AssertUnwindSafe(hook))
        .unwrap_or_else(|payload| Err(Error::from_panic(payload.as_ref())))
}

// ---------------------------------------------------------------------------
// Waiting
// ---------------------------------------------------------------------------

/// A registered waiter.
///
/// Dropping it (timeout, cancellation, or the acquire future itself being
/// dropped) closes the channel; a resource delivered in the meantime goes
/// back to the pool instead of being lost.
struct Waiting<'a, R: Resource> {
    shared: &'a Shared<R>,
    rx: Option<oneshot::Receiver<Entry<R>>>,
}

impl<R: Resource> Waiting<'_, R> {
    async fn recv(
        &mut self,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> std::result::Result<Entry<R>, GaveUp> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(GaveUp::TimedOut);
        };
        let received = match cancel {
            Some(token) => tokio::select! {
                biased;
                res = tokio::time::timeout(timeout, rx) => res.map_err(|_| GaveUp::TimedOut),
                () = token.cancelled() => Err(GaveUp::Cancelled),
            },
            None => tokio::time::timeout(timeout, rx)
                .await
                .map_err(|_| GaveUp::TimedOut),
        };

        let reason = match received {
            Ok(Ok(entry)) => {
                self.rx = None;
                return Ok(entry);
            }
            // sender gone without a delivery: nothing will arrive
            Ok(Err(_)) => GaveUp::TimedOut,
            Err(reason) => reason,
        };
        match self.give_up() {
            // delivered just as the wait ended
            Some(entry) => Ok(entry),
            None => Err(reason),
        }
    }

    fn give_up(&mut self) -> Option<Entry<R>> {
        let mut rx = self.rx.take()?;
        rx.close();
        let delivered = rx.try_recv().ok();
        if delivered.is_none() {
            self.shared.prune_waiters();
        }
        delivered
    }
}

impl<R: Resource> Drop for Waiting<'_, R> {
    fn drop(&mut self) {
        if let Some(entry) = self.give_up() {
            self.shared.put_back(entry);
        }
    }
}

// ---------------------------------------------------------------------------
// Pool<R>
// ---------------------------------------------------------------------------

/// Fixed-capacity pool of pre-built resources.
///
/// Cloning is cheap and every clone refers to the same resources.
pub struct Pool<R: Resource> {
    shared: Arc<Shared<R>>,
}

impl<R: Resource> Clone for Pool<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: Resource> std::fmt::Debug for Pool<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.shared.id)
            .field("name", &self.shared.config.name)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<F, T> Pool<FnResource<F>>
where
    F: Fn(&str) -> Result<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    /// Build a pool from a factory closure called once per identity.
    pub async fn from_fn(config: PoolConfig, factory: F) -> Result<Self> {
        Self::new(FnResource::new(factory), config).await
    }
}

impl<R: Resource> Pool<R> {
    /// Build all `config.capacity` resources and return the ready pool.
    ///
    /// # Errors
    /// `Error::Configuration` for an invalid config, `Error::Construction`
    /// if any factory call fails. No partial pool is ever returned.
    pub async fn new(resource: R, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let events = Arc::new(EventBus::new(config.event_buffer));
        Self::with_event_bus(resource, config, events).await
    }

    /// Like [`Pool::new`], emitting events on an existing bus.
    ///
    /// Subscribe before calling to observe the `Constructed` event.
    pub async fn with_event_bus(
        resource: R,
        config: PoolConfig,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        config.validate()?;
        let started = Instant::now();
        let mut idle = VecDeque::with_capacity(config.capacity);

        for n in 1..=config.capacity {
            let identity = config.identity(n);
            tracing::debug!(pool = %config.name, identity = %identity, "Creating pool instance");
            match resource.create(&identity).await {
                Ok(payload) => idle.push_back(PooledResource::new(identity, payload)),
                Err(source) => {
                    tracing::warn!(
                        pool = %config.name,
                        identity = %identity,
                        built = n - 1,
                        error = %source,
                        "Pool construction failed"
                    );
                    return Err(Error::Construction {
                        pool: config.name.clone(),
                        identity,
                        built: n - 1,
                        capacity: config.capacity,
                        source: Box::new(source),
                    });
                }
            }
        }

        let elapsed = started.elapsed();
        tracing::debug!(
            pool = %config.name,
            capacity = config.capacity,
            elapsed_ms = elapsed.as_millis() as u64,
            "Pool ready"
        );
        events.emit(PoolEvent::Constructed {
            pool: config.name.clone(),
            capacity: config.capacity,
            elapsed,
        });

        Ok(Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                resource,
                state: Mutex::new(State {
                    idle,
                    waiters: VecDeque::new(),
                    checked_out: 0,
                }),
                config,
                counters: Counters::default(),
                events,
            }),
        })
    }

    /// Check out a resource under `label`, waiting at most `timeout`.
    ///
    /// # Errors
    /// `Error::Exhausted` if nothing became available in time (pool state is
    /// left untouched), `Error::Hook` if the checkout hook failed (the
    /// resource is returned first).
    pub async fn acquire(&self, label: &str, timeout: Duration) -> Result<Checkout<R>> {
        self.acquire_inner(label, timeout, None).await
    }

    /// [`Pool::acquire`] with the configured `acquire_timeout`.
    pub async fn acquire_default(&self, label: &str) -> Result<Checkout<R>> {
        self.acquire_inner(label, self.shared.config.acquire_timeout, None)
            .await
    }

    /// [`Pool::acquire`] that also stops waiting when `cancel` fires.
    ///
    /// # Errors
    /// As [`Pool::acquire`], plus `Error::Cancelled`.
    pub async fn acquire_cancellable(
        &self,
        label: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Checkout<R>> {
        self.acquire_inner(label, timeout, Some(cancel)).await
    }

    async fn acquire_inner(
        &self,
        label: &str,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Checkout<R>> {
        let started = Instant::now();
        let entry = match self.shared.take_or_wait() {
            Take::Ready(entry) => entry,
            Take::Wait(mut waiting) => match waiting.recv(timeout, cancel).await {
                Ok(entry) => entry,
                Err(GaveUp::TimedOut) => return Err(self.shared.exhausted(timeout)),
                Err(GaveUp::Cancelled) => {
                    tracing::debug!(pool = %self.shared.name(), label, "Acquire cancelled");
                    return Err(Error::Cancelled {
                        pool: self.shared.config.name.clone(),
                    });
                }
            },
        };
        self.shared.hand_out(entry, label, started)
    }

    /// Return a checked-out resource to the pool.
    ///
    /// The checkin hook runs and the label is reset before the resource is
    /// handed to the oldest waiter (or parked as idle). Never blocks.
    ///
    /// # Errors
    /// `Error::Misuse` if `handle` came from a different pool; the handle is
    /// then returned to its own pool. `Error::Hook` if the checkin hook
    /// failed; the resource is still returned.
    pub fn release(&self, handle: Checkout<R>) -> Result<()> {
        if !handle.belongs_to(self.shared.id) {
            let err = Error::Misuse {
                pool: self.shared.id,
                owner: handle.pool_id(),
                identity: handle.identity().to_owned(),
            };
            tracing::warn!(pool = %self.shared.name(), error = %err, "Released foreign handle");
            return Err(err);
        }
        handle.check_in()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let (available, checked_out, waiters) = {
            let state = self.shared.state.lock();
            (state.idle.len(), state.checked_out, state.live_waiters())
        };
        let counters = &self.shared.counters;
        PoolStats {
            capacity: self.shared.config.capacity,
            available,
            checked_out,
            waiters,
            total_acquisitions: counters.acquisitions.load(Ordering::Relaxed),
            total_releases: counters.releases.load(Ordering::Relaxed),
            total_timeouts: counters.timeouts.load(Ordering::Relaxed),
            total_hook_failures: counters.hook_failures.load(Ordering::Relaxed),
        }
    }

    /// Identity and label of every idle resource, in hand-out order.
    #[must_use]
    pub fn idle_snapshot(&self) -> Vec<ResourceSnapshot> {
        let state = self.shared.state.lock();
        let snapshot = state.idle.iter().map(|entry| ResourceSnapshot {
            identity: entry.identity().to_owned(),
            label: entry.label().to_owned(),
            in_use: entry.in_use(),
            checkouts: entry.checkouts(),
        });
        match self.shared.config.strategy {
            Strategy::Lifo => snapshot.rev().collect(),
            Strategy::Fifo => snapshot.collect(),
        }
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.shared.events.subscribe()
    }

    /// Unique id of this pool.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Configured pool name.
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Fixed number of resources.
    pub fn capacity(&self) -> usize {
        self.shared.config.capacity
    }

    /// The resource definition this pool was built from.
    pub fn resource(&self) -> &R {
        &self.shared.resource
    }
}
