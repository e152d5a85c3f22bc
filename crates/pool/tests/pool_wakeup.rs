//! Waiter hand-off, fairness and cancellation-safety tests.
//!
//! A release must reach exactly one blocked waiter promptly, waiters are
//! served oldest first, and a waiter that stops waiting for any reason must
//! not swallow a resource.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use readypool::error::{Error, Result};
use readypool::pool::Pool;
use readypool::{PoolConfig, Resource};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

struct Slow;

impl Resource for Slow {
    type Payload = u32;

    async fn create(&self, _identity: &str) -> Result<u32> {
        Ok(0)
    }
}

async fn single() -> Pool<Slow> {
    let config = PoolConfig {
        name: "wakeup".to_string(),
        capacity: 1,
        ..Default::default()
    };
    Pool::new(Slow, config).await.unwrap()
}

async fn wait_for_waiters(pool: &Pool<Slow>, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while pool.stats().waiters < n {
        assert!(Instant::now() < deadline, "waiters never registered");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

// ---------------------------------------------------------------------------
// Hand-off
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn release_wakes_blocked_waiter_promptly() {
    let pool = single().await;
    let held = pool.acquire("a", Duration::from_secs(1)).await.unwrap();

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move {
        let handle = waiter_pool
            .acquire("b", Duration::from_secs(5))
            .await
            .expect("waiter should be served by the release");
        (Instant::now(), handle.label().to_owned())
    });
    wait_for_waiters(&pool, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let released_at = Instant::now();
    pool.release(held).unwrap();
    let (served_at, label) = waiter.await.unwrap();

    assert_eq!(label, "b");
    assert!(
        served_at.duration_since(released_at) < Duration::from_millis(500),
        "waiter was not woken by the release"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn waiters_are_served_in_arrival_order() {
    let pool = single().await;
    let held = pool.acquire("holder", Duration::from_secs(1)).await.unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for (i, name) in ["first", "second", "third"].into_iter().enumerate() {
        let pool_clone = pool.clone();
        let order = Arc::clone(&order);
        tasks.push(tokio::spawn(async move {
            let handle = pool_clone
                .acquire(name, Duration::from_secs(5))
                .await
                .unwrap();
            order.lock().push(handle.label().to_owned());
            tokio::time::sleep(Duration::from_millis(5)).await;
            pool_clone.release(handle).unwrap();
        }));
        wait_for_waiters(&pool, i + 1).await;
    }

    pool.release(held).unwrap();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*order.lock(), ["first", "second", "third"]);
    assert_eq!(pool.stats().available, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn timed_out_waiter_is_skipped_by_release() {
    let pool = single().await;
    let held = pool.acquire("holder", Duration::from_secs(1)).await.unwrap();

    let impatient = pool.acquire("impatient", Duration::from_millis(30)).await;
    assert!(matches!(impatient, Err(Error::Exhausted { .. })));

    let patient_pool = pool.clone();
    let patient = tokio::spawn(async move {
        patient_pool
            .acquire("patient", Duration::from_secs(5))
            .await
            .map(|handle| handle.label().to_owned())
    });
    wait_for_waiters(&pool, 1).await;

    pool.release(held).unwrap();
    assert_eq!(patient.await.unwrap().unwrap(), "patient");
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn aborted_acquire_does_not_leak_resource() {
    let pool = single().await;
    let held = pool.acquire("holder", Duration::from_secs(1)).await.unwrap();

    let pool_clone = pool.clone();
    let waiter = tokio::spawn(async move {
        let _ = pool_clone.acquire("doomed", Duration::from_secs(30)).await;
    });
    wait_for_waiters(&pool, 1).await;

    waiter.abort();
    let _ = waiter.await;
    assert_eq!(pool.stats().waiters, 0);

    pool.release(held).unwrap();
    let stats = pool.stats();
    assert_eq!(stats.available, 1);
    assert_eq!(stats.checked_out, 0);

    let again = pool
        .acquire("after", Duration::from_millis(100))
        .await
        .expect("pool should still work after an aborted acquire");
    assert_eq!(again.label(), "after");
}

#[tokio::test(flavor = "multi_thread")]
async fn dropped_acquire_racing_release_returns_resource() {
    // Repeat to hit the window where a release delivers to a waiter whose
    // future is being dropped.
    let pool = single().await;
    for _ in 0..200 {
        let held = pool.acquire("holder", Duration::from_secs(1)).await.unwrap();
        let pool_clone = pool.clone();
        let waiter = tokio::spawn(async move {
            let _ = pool_clone.acquire("racer", Duration::from_secs(5)).await;
        });
        wait_for_waiters(&pool, 1).await;

        waiter.abort();
        pool.release(held).unwrap();
        let _ = waiter.await;

        let stats = pool.stats();
        assert_eq!(stats.available + stats.checked_out, 1);
        assert_eq!(stats.available, 1, "resource lost in hand-off");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_token_stops_waiting() {
    let pool = single().await;
    let held = pool.acquire("holder", Duration::from_secs(1)).await.unwrap();
    let token = CancellationToken::new();

    let pool_clone = pool.clone();
    let token_clone = token.clone();
    let waiter = tokio::spawn(async move {
        pool_clone
            .acquire_cancellable("cancelled", Duration::from_secs(30), &token_clone)
            .await
            .map(|_| ())
    });
    wait_for_waiters(&pool, 1).await;

    let started = Instant::now();
    token.cancel();
    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled { .. })));
    assert!(started.elapsed() < Duration::from_secs(1));

    pool.release(held).unwrap();
    let stats = pool.stats();
    assert_eq!(stats.available, 1);
    assert_eq!(stats.waiters, 0);
    assert_eq!(stats.total_timeouts, 0);
}

#[tokio::test]
async fn cancellable_acquire_succeeds_when_available() {
    let pool = single().await;
    let token = CancellationToken::new();
    let handle = pool
        .acquire_cancellable("ok", Duration::from_secs(1), &token)
        .await
        .unwrap();
    assert_eq!(handle.label(), "ok");
}
