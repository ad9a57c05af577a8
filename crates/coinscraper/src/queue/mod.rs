//! At-least-once work queue for `(job_id, item)` units.
//!
//! A unit is handed out under a lease. The holder either acks it (removed
//! for good) or nacks it with a backoff (redelivered later). A lease that is
//! never resolved expires and the unit is delivered again, which is how a
//! crashed worker's unit is recovered.

pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;

pub use sqlite::SqliteTaskQueue;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Queue is closed")]
    Closed,

    #[error("Lease on unit {unit_id} is no longer held")]
    LeaseLost { unit_id: i64 },

    #[error("Queue rejected unit: {0}")]
    Rejected(String),

    #[error("Corrupt queue unit {unit_id}: {reason}")]
    CorruptUnit { unit_id: i64, reason: String },
}

/// Payload of one queued piece of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub job_id: Uuid,
    pub item: String,
    /// Deliveries so far, including the current one when held under a lease.
    pub attempt_count: u32,
}

impl Unit {
    pub fn new(job_id: Uuid, item: impl Into<String>) -> Self {
        Self {
            job_id,
            item: item.into(),
            attempt_count: 0,
        }
    }
}

/// Temporary exclusive grant of a unit to one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub token: String,
    pub unit_id: i64,
    pub unit: Unit,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// 1-based attempt number of this delivery.
    pub fn attempt(&self) -> u32 {
        self.unit.attempt_count
    }
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Accepts a unit for delivery.
    async fn enqueue(&self, unit: Unit) -> Result<(), QueueError>;

    /// Waits until a unit can be leased and returns the lease.
    ///
    /// Must be cancel safe: dropping the future before it resolves must not
    /// grant a lease.
    async fn dequeue(&self) -> Result<Lease, QueueError>;

    /// Removes a leased unit permanently.
    async fn ack(&self, lease: &Lease) -> Result<(), QueueError>;

    /// Returns a leased unit to the queue, due again after `backoff`.
    async fn nack(&self, lease: &Lease, backoff: Duration) -> Result<(), QueueError>;
}
