// Counter store — durable, TTL-scoped integer values keyed by string.
//
// Policies that need memory across events (rate limiting, duplicate
// detection) get a handle to a CounterStore instead of reaching for a
// global. The relay may run several policy processes against one SQLite
// file, so the store is the only state shared between them.
//
// Implementors: MemoryStore (tests, no `sqlite` feature), SqliteStore.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod queries;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value for `key`, or None if it was never set or has expired.
    async fn get(&self, key: &str) -> Result<Option<i64>>;

    /// Overwrite `key` with `value`, expiring `ttl` from now.
    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<()>;

    /// Delete every expired entry, returning how many were removed.
    async fn prune(&self) -> Result<u64>;

    /// Number of live (unexpired) entries.
    async fn count(&self) -> Result<u64>;
}
