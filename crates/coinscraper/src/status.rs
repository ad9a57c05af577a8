//! Point-in-time job status.
//!
//! A view only reflects tasks persisted so far. It cannot tell a finished
//! job from one still in flight; callers compare the persisted items with
//! the items they requested.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;
use crate::store::{is_failure_marker, Output, ResultStore, Task};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Persisted tasks in insertion order.
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub item: String,
    pub output: Output,
    pub created_at: DateTime<Utc>,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            item: task.item,
            output: task.output,
            created_at: task.created_at,
        }
    }
}

impl TaskView {
    pub fn is_failure(&self) -> bool {
        is_failure_marker(&self.output)
    }
}

impl JobView {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_failure()).count()
    }

    /// True once every requested item has at least as many task rows as it
    /// was requested. A redelivered duplicate of one item does not stand in
    /// for another.
    pub fn is_complete(&self, requested: &[String]) -> bool {
        let mut outstanding: HashMap<&str, usize> = HashMap::new();
        for item in requested {
            *outstanding.entry(item.as_str()).or_default() += 1;
        }
        for task in &self.tasks {
            if let Some(left) = outstanding.get_mut(task.item.as_str()) {
                *left = left.saturating_sub(1);
            }
        }
        outstanding.values().all(|left| *left == 0)
    }
}

/// Read-side only; holds no state of its own.
pub struct StatusAggregator {
    store: Arc<dyn ResultStore>,
}

impl StatusAggregator {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self { store }
    }

    pub async fn get_status(&self, job_id: Uuid) -> Result<JobView, JobError> {
        let job = self
            .store
            .find_job(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        let tasks = self.store.list_tasks(job.id).await?;

        Ok(JobView {
            id: job.id,
            created_at: job.created_at,
            tasks: tasks.into_iter().map(TaskView::from).collect(),
        })
    }

    /// Like [`get_status`](Self::get_status) for an id given as text. Text
    /// that is not a UUID names no job.
    pub async fn get_status_str(&self, job_id: &str) -> Result<JobView, JobError> {
        let id = Uuid::parse_str(job_id).map_err(|_| JobError::NotFound(job_id.to_string()))?;
        self.get_status(id).await
    }
}
