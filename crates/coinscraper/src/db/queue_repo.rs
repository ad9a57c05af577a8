//! Leased work units in the `queue_units` table.
//!
//! Times are Unix epoch milliseconds. A unit is leasable when it carries no
//! lease and is due, or when its lease has expired.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw queue unit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRow {
    pub id: i64,
    pub job_id: String,
    pub item: String,
    pub attempt_count: u32,
    pub available_at: i64,
    pub lease_id: Option<String>,
    pub lease_expires_at: Option<i64>,
    pub enqueued_at: String,
}

impl UnitRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            item: row.get("item")?,
            attempt_count: row.get("attempt_count")?,
            available_at: row.get("available_at")?,
            lease_id: row.get("lease_id")?,
            lease_expires_at: row.get("lease_expires_at")?,
            enqueued_at: row.get("enqueued_at")?,
        })
    }
}

const LEASABLE: &str = "(lease_id IS NULL AND available_at <= ?1)
     OR (lease_id IS NOT NULL AND lease_expires_at <= ?1)";

/// Inserts a unit that is available at `available_at` and returns its id.
pub fn insert(
    db: &Database,
    job_id: &str,
    item: &str,
    available_at: i64,
    enqueued_at: &str,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO queue_units (job_id, item, attempt_count, available_at, enqueued_at)
             VALUES (?1, ?2, 0, ?3, ?4)",
            params![job_id, item, available_at, enqueued_at],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Leases the oldest leasable unit, if any.
///
/// The select and the lease update run in one transaction, so a unit is
/// granted to a single caller. The attempt counter is incremented.
pub fn lease_next(
    db: &Database,
    now: i64,
    lease_id: &str,
    lease_expires_at: i64,
) -> Result<Option<UnitRow>, DatabaseError> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        let candidate: Option<i64> = tx
            .query_row(
                &format!("SELECT id FROM queue_units WHERE {LEASABLE} ORDER BY id ASC LIMIT 1"),
                params![now],
                |r| r.get(0),
            )
            .optional()?;

        let Some(id) = candidate else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE queue_units
             SET lease_id = ?2, lease_expires_at = ?3, attempt_count = attempt_count + 1
             WHERE id = ?1",
            params![id, lease_id, lease_expires_at],
        )?;
        let row = tx.query_row(
            "SELECT * FROM queue_units WHERE id = ?1",
            params![id],
            UnitRow::from_row,
        )?;
        tx.commit()?;
        Ok(Some(row))
    })
}

/// Deletes a unit if `lease_id` still holds it. Returns `false` if the lease
/// was lost (expired and re-granted, or the unit is gone).
pub fn delete_leased(db: &Database, id: i64, lease_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "DELETE FROM queue_units WHERE id = ?1 AND lease_id = ?2",
            params![id, lease_id],
        )?;
        Ok(affected > 0)
    })
}

/// Clears the lease and makes the unit due again at `available_at`.
/// Returns `false` if `lease_id` no longer holds the unit.
pub fn release(
    db: &Database,
    id: i64,
    lease_id: &str,
    available_at: i64,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE queue_units SET lease_id = NULL, lease_expires_at = NULL, available_at = ?3
             WHERE id = ?1 AND lease_id = ?2",
            params![id, lease_id, available_at],
        )?;
        Ok(affected > 0)
    })
}

/// Finds a unit by id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<UnitRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM queue_units WHERE id = ?1",
                params![id],
                UnitRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Counts all units still in the queue, leased or not.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM queue_units", [], |r| r.get(0))?;
        Ok(count)
    })
}

/// Counts the units of one job still in the queue.
pub fn count_by_job(db: &Database, job_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM queue_units WHERE job_id = ?1",
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
