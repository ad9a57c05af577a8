use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::queue::QueueError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum CoinScraperError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum JobError {
    /// The item list was rejected before anything was persisted.
    #[error("Invalid input{}: {reason}", at_index(.index))]
    InvalidInput { index: Option<usize>, reason: String },

    #[error("Job not found: {0}")]
    NotFound(String),

    /// The job exists but only the first `enqueued` of `requested` units
    /// reached the queue.
    #[error("Job {job_id}: enqueued {enqueued} of {requested} units: {source}")]
    DispatchPartialFailure {
        job_id: Uuid,
        enqueued: usize,
        requested: usize,
        #[source]
        source: QueueError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to persist result: {0}")]
    Store(#[from] StoreError),

    #[error("Queue operation failed: {0}")]
    Queue(#[from] QueueError),
}

fn at_index(index: &Option<usize>) -> String {
    index.map(|i| format!(" at index {}", i)).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, CoinScraperError>;
