//! Concurrent stress test for the pool.
//!
//! 50 tasks doing acquire/release cycles against 10 resources: no deadlock,
//! no resource handed to two callers at once, counters consistent.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use readypool::error::Result;
use readypool::pool::Pool;
use readypool::{PoolConfig, Resource, Strategy};
use tokio::task::JoinSet;

struct StressResource;

impl Resource for StressResource {
    type Payload = u64;

    async fn create(&self, _identity: &str) -> Result<u64> {
        // simulate an expensive build
        tokio::time::sleep(Duration::from_micros(100)).await;
        Ok(0)
    }
}

async fn run_stress(strategy: Strategy) {
    let config = PoolConfig {
        name: "stress".to_string(),
        capacity: 10,
        strategy,
        ..Default::default()
    };
    let pool = Pool::new(StressResource, config).await.unwrap();
    let in_use = Arc::new(Mutex::new(HashSet::new()));
    let success_count = Arc::new(AtomicU64::new(0));
    let mut set = JoinSet::new();

    for task in 0..50 {
        let pool = pool.clone();
        let in_use = Arc::clone(&in_use);
        let success_count = Arc::clone(&success_count);
        set.spawn(async move {
            for cycle in 0..20 {
                let label = format!("task-{task}-{cycle}");
                let mut guard = pool
                    .acquire(&label, Duration::from_secs(10))
                    .await
                    .expect("task should acquire");
                assert!(
                    in_use.lock().insert(guard.identity().to_owned()),
                    "{} handed out twice",
                    guard.identity()
                );
                assert_eq!(guard.label(), label);

                *guard += 1;
                tokio::time::sleep(Duration::from_millis(1)).await;

                in_use.lock().remove(guard.identity());
                if cycle % 2 == 0 {
                    pool.release(guard).unwrap();
                } else {
                    drop(guard);
                }

                let stats = pool.stats();
                assert_eq!(stats.available + stats.checked_out, stats.capacity);
            }
            success_count.fetch_add(1, Ordering::SeqCst);
        });
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while let Some(result) = tokio::time::timeout_at(deadline, set.join_next())
        .await
        .expect("stress test should not deadlock (30s timeout)")
    {
        result.expect("task should not panic");
    }

    assert_eq!(success_count.load(Ordering::SeqCst), 50);

    let stats = pool.stats();
    assert_eq!(stats.available, 10);
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.waiters, 0);
    assert_eq!(stats.total_acquisitions, 1000);
    assert_eq!(stats.total_releases, 1000);
    assert_eq!(stats.total_timeouts, 0);

    // every use incremented exactly one payload
    let mut total = 0;
    let mut handles = Vec::new();
    for _ in 0..10 {
        let handle = pool.acquire("tally", Duration::from_secs(1)).await.unwrap();
        total += *handle;
        handles.push(handle);
    }
    assert_eq!(total, 1000);
    assert!(handles.iter().all(|h| h.label() == "tally"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_50_tasks_lifo() {
    run_stress(Strategy::Lifo).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_50_tasks_fifo() {
    run_stress(Strategy::Fifo).await;
}
