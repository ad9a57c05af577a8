//! Job creation and dispatch.
//!
//! The orchestrator is the only writer of job existence. It validates the
//! whole request, persists the job, then enqueues one unit per item and
//! returns without waiting for any of them to run.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};

use crate::error::JobError;
use crate::queue::{TaskQueue, Unit};
use crate::store::{Job, ResultStore};

pub struct JobOrchestrator {
    store: Arc<dyn ResultStore>,
    queue: Arc<dyn TaskQueue>,
}

impl JobOrchestrator {
    pub fn new(store: Arc<dyn ResultStore>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { store, queue }
    }

    /// Creates a job and enqueues one unit per item, in item order.
    ///
    /// Nothing is persisted when any item is empty. Once the job is durable
    /// it is never rolled back: a rejected enqueue stops dispatch and is
    /// reported as [`JobError::DispatchPartialFailure`].
    pub async fn start_job(&self, items: &[String]) -> Result<Job, JobError> {
        validate_items(items)?;

        let job = Job::new();
        let span = info_span!("start_job", job_id = %job.id, items = items.len());
        self.dispatch(job, items).instrument(span).await
    }

    async fn dispatch(&self, job: Job, items: &[String]) -> Result<Job, JobError> {
        self.store.create_job(&job).await?;

        for (enqueued, item) in items.iter().enumerate() {
            if let Err(source) = self.queue.enqueue(Unit::new(job.id, item.clone())).await {
                warn!(
                    "Dispatch stopped after {} of {} units: {}",
                    enqueued,
                    items.len(),
                    source
                );
                return Err(JobError::DispatchPartialFailure {
                    job_id: job.id,
                    enqueued,
                    requested: items.len(),
                    source,
                });
            }
        }

        info!("Dispatched {} units", items.len());
        Ok(job)
    }

    /// Accepts a raw request body, which must be a JSON array of strings.
    pub async fn start_job_json(&self, body: &Value) -> Result<Job, JobError> {
        let items = parse_items(body)?;
        self.start_job(&items).await
    }
}

fn validate_items(items: &[String]) -> Result<(), JobError> {
    match items.iter().position(|item| item.is_empty()) {
        Some(index) => Err(JobError::InvalidInput {
            index: Some(index),
            reason: "item is an empty string".to_string(),
        }),
        None => Ok(()),
    }
}

fn parse_items(body: &Value) -> Result<Vec<String>, JobError> {
    let array = body.as_array().ok_or_else(|| JobError::InvalidInput {
        index: None,
        reason: format!("expected an array of strings, got {}", json_kind(body)),
    })?;

    array
        .iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::String(item) => Ok(item.clone()),
            other => Err(JobError::InvalidInput {
                index: Some(index),
                reason: format!("expected a string, got {}", json_kind(other)),
            }),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
