//! Append-only access to the `tasks` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw task row from the database.
#[derive(Debug, Clone)]
pub struct TaskRow {
    /// Insertion sequence, monotonically increasing across all jobs.
    pub seq: i64,
    pub job_id: String,
    pub item: String,
    /// JSON-encoded output object.
    pub output: String,
    pub created_at: String,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            seq: row.get("seq")?,
            job_id: row.get("job_id")?,
            item: row.get("item")?,
            output: row.get("output")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// A task row before insertion.
#[derive(Debug, Clone)]
pub struct NewTaskRow {
    pub job_id: String,
    pub item: String,
    pub output: String,
    pub created_at: String,
}

/// Inserts a new task row and returns its sequence number.
pub fn insert(db: &Database, task: &NewTaskRow) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO tasks (job_id, item, output, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![task.job_id, task.item, task.output, task.created_at],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Lists all tasks of a job in insertion order.
pub fn list_by_job(db: &Database, job_id: &str) -> Result<Vec<TaskRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT seq, job_id, item, output, created_at FROM tasks
             WHERE job_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![job_id], TaskRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
