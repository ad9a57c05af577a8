//! Durable storage for jobs and the tasks they produce.

pub mod model;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;

pub use model::{failure_marker, is_failure_marker, Job, NewTask, Output, Task, FAILURE_KEY};
pub use sqlite::SqliteResultStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Corrupt {table} row '{id}': {reason}")]
    CorruptRow {
        table: &'static str,
        id: String,
        reason: String,
    },
}

/// Keyed storage for jobs and their tasks.
///
/// Tasks are append-only and jobs are never updated, so implementations
/// must accept concurrent inserts and reads without coordinating between
/// callers.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persists a new job. Fails if the id is already taken.
    async fn create_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Looks up a job by id.
    async fn find_job(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Appends a task row for an existing job.
    async fn insert_task(&self, task: &NewTask) -> Result<Task, StoreError>;

    /// Lists a job's tasks in insertion order.
    async fn list_tasks(&self, job_id: Uuid) -> Result<Vec<Task>, StoreError>;
}
