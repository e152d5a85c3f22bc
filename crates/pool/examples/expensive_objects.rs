//! Expensive objects example
//!
//! Compares building an object every time one is needed with checking
//! pre-built objects out of a pool, then checks out more objects than the
//! pool holds to show exhaustion.
//!
//! Run with `RUST_LOG=readypool=debug` to see checkout / checkin events.

use std::time::{Duration, Instant};

use readypool::{Error, Pool, PoolConfig, Resource, Result};
use tracing_subscriber::EnvFilter;

/// Something that is slow to build.
struct ExpensiveObject {
    built_for: String,
}

impl ExpensiveObject {
    async fn build(name: &str, n: usize) -> Self {
        // irregular creation time
        let delay = 150 + (n as u64 * 37) % 100;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Self {
            built_for: name.to_string(),
        }
    }

    fn some_process(&self, label: &str) {
        println!(
            "   +- ExpensiveObject ({label}, built for {}) some_process called",
            self.built_for
        );
    }
}

struct ExpensiveObjects;

impl Resource for ExpensiveObjects {
    type Payload = ExpensiveObject;

    async fn create(&self, identity: &str) -> Result<ExpensiveObject> {
        println!("+- Creating pool {identity}");
        let n = identity
            .rsplit(' ')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        Ok(ExpensiveObject::build(identity, n).await)
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("readypool=info")),
        )
        .init();

    let object_count = 8;

    println!("Creating objects every time one is needed:");
    let started = Instant::now();
    for i in 1..=object_count {
        let name = format!("object {i:02}");
        let object = ExpensiveObject::build(&name, i).await;
        object.some_process(&name);
    }
    println!(
        "Creating and using {object_count} objects took {:.2?}\n",
        started.elapsed()
    );

    let config = PoolConfig {
        name: "expensive".to_string(),
        capacity: object_count / 4,
        acquire_timeout: Duration::from_millis(500),
        ..Default::default()
    };
    let started = Instant::now();
    let pool = Pool::new(ExpensiveObjects, config).await?;
    println!(
        "Creating {} pooled objects took {:.2?}\n",
        pool.capacity(),
        started.elapsed()
    );

    println!("Acquiring pre-built objects:");
    let started = Instant::now();
    for i in 1..=object_count {
        let object = pool.acquire_default(&format!("check_out {i}")).await?;
        println!("+- {} ({})", object.label(), object.identity());
        object.some_process(object.label());
        pool.release(object)?;
    }
    println!(
        "Using {object_count} pool objects took {:.2?}\n",
        started.elapsed()
    );

    println!("Retrieving all instances:");
    let mut held = Vec::new();
    for i in 1..=object_count {
        match pool.acquire_default(&format!("check_out {i}")).await {
            Ok(object) => {
                println!("+- {} ({})", object.label(), object.identity());
                held.push(object);
            }
            Err(err @ Error::Exhausted { .. }) => {
                println!("+- {err}");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }
    drop(held);

    println!("\nFinal stats: {:?}", pool.stats());
    Ok(())
}
