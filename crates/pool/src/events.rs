//! Event broadcasting for pool lifecycle observability.
//!
//! Provides [`PoolEvent`] variants emitted by a [`Pool`](crate::Pool) and an
//! [`EventBus`] backed by `tokio::sync::broadcast`.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::HookPhase;

/// Events emitted during pool operations.
///
/// Every variant carries the `pool` name. Subscribers receive cloned copies
/// via [`EventBus::subscribe`].
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    /// All resources were built and the pool is ready.
    Constructed {
        /// Pool name.
        pool: String,
        /// Number of resources built.
        capacity: usize,
        /// Time spent in the factory.
        elapsed: Duration,
    },
    /// A resource was handed to a caller.
    Acquired {
        /// Pool name.
        pool: String,
        /// Identity of the resource.
        identity: String,
        /// Checkout label.
        label: String,
        /// Time the caller spent waiting.
        waited: Duration,
    },
    /// A resource came back to the pool.
    Released {
        /// Pool name.
        pool: String,
        /// Identity of the resource.
        identity: String,
        /// How long the caller held it.
        held: Duration,
    },
    /// An acquire gave up because nothing became available in time.
    Exhausted {
        /// Pool name.
        pool: String,
        /// Callers still waiting.
        waiters: usize,
        /// The timeout that elapsed.
        timeout: Duration,
    },
    /// A checkout or checkin hook failed.
    HookFailed {
        /// Pool name.
        pool: String,
        /// Identity of the resource.
        identity: String,
        /// Which hook failed.
        phase: HookPhase,
        /// Human-readable error description.
        error: String,
    },
}

/// Broadcast-based event bus for pool events.
///
/// Emission is fire-and-forget: with no subscribers, or a full channel,
/// events are dropped and the emitter never waits.
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    ///
    /// Subscribers that fall more than `buffer_size` events behind receive a
    /// `Lagged` error and skip ahead.
    ///
    /// # Panics
    /// Panics if `buffer_size` is zero.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: PoolEvent) {
        // no receivers is not an error
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.emit(PoolEvent::Exhausted {
            pool: "p".to_string(),
            waiters: 0,
            timeout: Duration::from_millis(1),
        });
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(PoolEvent::Released {
            pool: "db".to_string(),
            identity: "instance 1".to_string(),
            held: Duration::from_millis(3),
        });

        match rx.recv().await.expect("should receive event") {
            PoolEvent::Released { identity, .. } => assert_eq!(identity, "instance 1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for waiters in 0..5 {
            bus.emit(PoolEvent::Exhausted {
                pool: "p".to_string(),
                waiters,
                timeout: Duration::ZERO,
            });
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert!(matches!(
            rx.recv().await,
            Ok(PoolEvent::Exhausted { waiters: 3, .. })
        ));
    }
}
