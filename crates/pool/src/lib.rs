//! # readypool
//!
//! A fixed-size pool of expensive-to-build resources.
//!
//! Every resource is built once, up front, by a [`Resource`] factory. Callers
//! check resources out with [`Pool::acquire`], which waits (without polling)
//! up to a timeout when all of them are in use, and give them back with
//! [`Pool::release`] or by dropping the [`Checkout`] handle. Waiters are
//! served in arrival order.
//!
//! ```rust,no_run
//! # async fn demo() -> readypool::Result<()> {
//! use std::time::Duration;
//! use readypool::{Pool, PoolConfig};
//!
//! let pool = Pool::from_fn(PoolConfig::with_capacity(2), |identity: &str| {
//!     Ok(format!("connection for {identity}"))
//! })
//! .await?;
//!
//! let conn = pool.acquire("job-1", Duration::from_secs(1)).await?;
//! assert_eq!(conn.label(), "job-1");
//! pool.release(conn)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod entry;
pub mod error;
pub mod events;
pub mod guard;
pub mod pool;
pub mod resource;

pub use config::{PoolConfig, Strategy};
pub use error::{Error, HookPhase, Result};
pub use events::{EventBus, PoolEvent};
pub use guard::Checkout;
pub use pool::{Pool, PoolStats, ResourceSnapshot};
pub use resource::{FnResource, Resource};
