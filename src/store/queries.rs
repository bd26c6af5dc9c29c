// Counter queries — every SQL statement the store runs lives here.
//
// All functions take `now_ms` explicitly so expiry is testable without a
// real clock; SqliteStore passes the current wall-clock time.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

/// Read a counter, treating rows past their expiry as absent.
pub fn get_counter(conn: &Connection, key: &str, now_ms: i64) -> Result<Option<i64>> {
    let mut stmt =
        conn.prepare_cached("SELECT value FROM counters WHERE key = ?1 AND expires_at > ?2")?;
    let result = stmt
        .query_row(params![key, now_ms], |row| row.get(0))
        .optional()?;
    Ok(result)
}

/// Upsert a counter with a fresh expiry.
pub fn set_counter(conn: &Connection, key: &str, value: i64, expires_at_ms: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO counters (key, value, expires_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = ?2, expires_at = ?3",
        params![key, value, expires_at_ms],
    )?;
    Ok(())
}

/// Delete expired counters and return how many went.
pub fn prune_expired(conn: &Connection, now_ms: i64) -> Result<u64> {
    let removed = conn.execute("DELETE FROM counters WHERE expires_at <= ?1", params![now_ms])?;
    Ok(removed as u64)
}

/// Count counters that haven't expired.
pub fn live_count(conn: &Connection, now_ms: i64) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM counters WHERE expires_at > ?1",
        params![now_ms],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}
