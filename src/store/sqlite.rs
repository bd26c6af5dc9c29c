// SqliteStore — rusqlite backend implementing the CounterStore trait.
//
// The Connection is wrapped in tokio::sync::Mutex; trait methods lock it,
// do synchronous rusqlite work, and return. Several relay policy processes
// may open the same file, so WAL mode and a busy timeout are always set.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::{queries, schema, CounterStore};

/// How long to wait on another process's write lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an already-opened rusqlite Connection. Tables must already exist.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open (or create) the store file and run migrations.
    pub fn initialize(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory for store: {db_path}"))?;
            }
        }

        let conn = connect(db_path)?;
        schema::create_tables(&conn)?;
        Ok(Self::new(conn))
    }

    /// Open an existing store (fails if it doesn't exist yet).
    pub fn open(db_path: &str) -> Result<Self> {
        if !Path::new(db_path).exists() {
            anyhow::bail!("Store not found at {db_path}. Run `strainer init` first.");
        }
        Ok(Self::new(connect(db_path)?))
    }

    /// In-memory SQLite, for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::create_tables(&conn)?;
        Ok(Self::new(conn))
    }

    /// Number of tables (for `strainer init` output).
    pub async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        schema::table_count(&conn)
    }
}

fn connect(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open store at {db_path}"))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl CounterStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().await;
        queries::get_counter(&conn, key, now_ms())
    }

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_ms().saturating_add(ttl_ms);
        let conn = self.conn.lock().await;
        queries::set_counter(&conn, key, value, expires_at)
    }

    async fn prune(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        queries::prune_expired(&conn, now_ms())
    }

    async fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        queries::live_count(&conn, now_ms())
    }
}
