//! `ResultStore` backed by the SQLite `jobs` and `tasks` tables.

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::model::{format_timestamp, parse_timestamp, Job, NewTask, Output, Task};
use super::{ResultStore, StoreError};
use crate::db::job_repo::{self, JobRow};
use crate::db::task_repo::{self, NewTaskRow, TaskRow};
use crate::db::Database;

#[derive(Clone)]
pub struct SqliteResultStore {
    db: Database,
}

impl SqliteResultStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn job_from_row(row: JobRow) -> Result<Job, StoreError> {
    let id = Uuid::parse_str(&row.id).map_err(|e| StoreError::CorruptRow {
        table: "jobs",
        id: row.id.clone(),
        reason: format!("invalid id: {}", e),
    })?;
    let created_at = parse_timestamp(&row.created_at).map_err(|e| StoreError::CorruptRow {
        table: "jobs",
        id: row.id.clone(),
        reason: format!("invalid created_at: {}", e),
    })?;
    Ok(Job { id, created_at })
}

fn task_from_row(job_id: Uuid, row: TaskRow) -> Result<Task, StoreError> {
    let corrupt = |reason: String| StoreError::CorruptRow {
        table: "tasks",
        id: row.seq.to_string(),
        reason,
    };
    let output: Output = serde_json::from_str(&row.output)
        .map_err(|e| corrupt(format!("invalid output JSON: {}", e)))?;
    let created_at = parse_timestamp(&row.created_at)
        .map_err(|e| corrupt(format!("invalid created_at: {}", e)))?;
    Ok(Task {
        job_id,
        item: row.item,
        output,
        created_at,
    })
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let row = JobRow {
            id: job.id.to_string(),
            created_at: format_timestamp(&job.created_at),
        };
        self.db
            .run_blocking(move |db| job_repo::insert(db, &row))
            .await?;
        Ok(())
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let id = id.to_string();
        self.db
            .run_blocking(move |db| job_repo::find_by_id(db, &id))
            .await?
            .map(job_from_row)
            .transpose()
    }

    async fn insert_task(&self, task: &NewTask) -> Result<Task, StoreError> {
        let created_at = Utc::now();
        let row = NewTaskRow {
            job_id: task.job_id.to_string(),
            item: task.item.clone(),
            output: serde_json::Value::Object(task.output.clone()).to_string(),
            created_at: format_timestamp(&created_at),
        };
        self.db
            .run_blocking(move |db| task_repo::insert(db, &row))
            .await?;
        Ok(Task {
            job_id: task.job_id,
            item: task.item.clone(),
            output: task.output.clone(),
            created_at,
        })
    }

    async fn list_tasks(&self, job_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let id = job_id.to_string();
        self.db
            .run_blocking(move |db| task_repo::list_by_job(db, &id))
            .await?
            .into_iter()
            .map(|row| task_from_row(job_id, row))
            .collect()
    }
}
