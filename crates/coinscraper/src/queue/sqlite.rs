//! `TaskQueue` persisted in the `queue_units` table.
//!
//! Units survive restarts. Waiting workers are woken in-process when units
//! are added or returned, and re-check the table every poll interval so
//! that delayed and expired units are picked up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use super::{Lease, QueueError, TaskQueue, Unit};
use crate::db::queue_repo::{self, UnitRow};
use crate::db::Database;
use crate::store::model::format_timestamp;

pub struct SqliteTaskQueue {
    db: Database,
    lease_timeout: Duration,
    poll_interval: Duration,
    notify: Notify,
    closed: AtomicBool,
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

impl SqliteTaskQueue {
    pub fn new(db: Database, lease_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            db,
            lease_timeout,
            poll_interval,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Leases the next due unit without waiting.
    pub async fn try_lease(&self) -> Result<Option<Lease>, QueueError> {
        let now = Utc::now().timestamp_millis();
        let expires_at = now.saturating_add(millis(self.lease_timeout));
        let token = Uuid::new_v4().to_string();

        let leased = {
            let token = token.clone();
            self.db
                .run_blocking(move |db| queue_repo::lease_next(db, now, &token, expires_at))
                .await?
        };
        let Some(row) = leased else {
            return Ok(None);
        };
        lease_from_row(row, token, expires_at).map(Some)
    }

    /// Units still queued, leased or waiting.
    pub async fn pending_count(&self) -> Result<u64, QueueError> {
        Ok(self.db.run_blocking(queue_repo::count).await?)
    }

    /// Units of one job still queued.
    pub async fn pending_for_job(&self, job_id: Uuid) -> Result<u64, QueueError> {
        let job_id = job_id.to_string();
        Ok(self
            .db
            .run_blocking(move |db| queue_repo::count_by_job(db, &job_id))
            .await?)
    }

    /// Stops accepting units and releases every blocked `dequeue`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn lease_from_row(row: UnitRow, token: String, expires_at: i64) -> Result<Lease, QueueError> {
    let job_id = Uuid::parse_str(&row.job_id).map_err(|e| QueueError::CorruptUnit {
        unit_id: row.id,
        reason: format!("invalid job id: {}", e),
    })?;
    let expires_at =
        DateTime::<Utc>::from_timestamp_millis(expires_at).ok_or(QueueError::CorruptUnit {
            unit_id: row.id,
            reason: "lease expiry out of range".to_string(),
        })?;
    Ok(Lease {
        token,
        unit_id: row.id,
        unit: Unit {
            job_id,
            item: row.item,
            attempt_count: row.attempt_count,
        },
        expires_at,
    })
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    async fn enqueue(&self, unit: Unit) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }

        let now = Utc::now();
        let job_id = unit.job_id.to_string();
        let created_at = format_timestamp(&now);
        self.db
            .run_blocking(move |db| {
                queue_repo::insert(db, &job_id, &unit.item, now.timestamp_millis(), &created_at)
            })
            .await?;
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dequeue(&self) -> Result<Lease, QueueError> {
        loop {
            if self.is_closed() {
                return Err(QueueError::Closed);
            }

            // Register for wakeups before looking, so an enqueue landing
            // between the check and the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(lease) = self.try_lease().await? {
                return Ok(lease);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn ack(&self, lease: &Lease) -> Result<(), QueueError> {
        let (unit_id, token) = (lease.unit_id, lease.token.clone());
        let deleted = self
            .db
            .run_blocking(move |db| queue_repo::delete_leased(db, unit_id, &token))
            .await?;
        if deleted {
            Ok(())
        } else {
            Err(QueueError::LeaseLost {
                unit_id: lease.unit_id,
            })
        }
    }

    async fn nack(&self, lease: &Lease, backoff: Duration) -> Result<(), QueueError> {
        let available_at = Utc::now()
            .timestamp_millis()
            .saturating_add(millis(backoff));
        let (unit_id, token) = (lease.unit_id, lease.token.clone());
        let released = self
            .db
            .run_blocking(move |db| queue_repo::release(db, unit_id, &token, available_at))
            .await?;
        if released {
            self.notify.notify_waiters();
            Ok(())
        } else {
            Err(QueueError::LeaseLost {
                unit_id: lease.unit_id,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Job, ResultStore, SqliteResultStore};
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    async fn setup(lease_timeout: Duration) -> (SqliteTaskQueue, Job) {
        let db = Database::open_in_memory().unwrap();
        let job = Job::new();
        SqliteResultStore::new(db.clone()).create_job(&job).await.unwrap();
        let queue = SqliteTaskQueue::new(db, lease_timeout, Duration::from_millis(5));
        (queue, job)
    }

    #[tokio::test]
    async fn test_enqueue_then_dequeue() {
        let (queue, job) = setup(Duration::from_secs(60)).await;
        queue.enqueue(Unit::new(job.id, "BTC")).await.unwrap();

        let lease = queue.dequeue().await.unwrap();
        assert_eq!(lease.unit.job_id, job.id);
        assert_eq!(lease.unit.item, "BTC");
        assert_eq!(lease.attempt(), 1);
        assert!(lease.expires_at > Utc::now());

        // Leased units are not handed out twice.
        assert!(queue.try_lease().await.unwrap().is_none());

        queue.ack(&lease).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let (queue, job) = setup(Duration::from_secs(60)).await;
        let queue = Arc::new(queue);

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.enqueue(Unit::new(job.id, "ETH")).await.unwrap();
        let lease = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(lease.unit.item, "ETH");
    }

    #[tokio::test]
    async fn test_nack_redelivers_after_backoff() {
        let (queue, job) = setup(Duration::from_secs(60)).await;
        queue.enqueue(Unit::new(job.id, "BTC")).await.unwrap();

        let lease = queue.dequeue().await.unwrap();
        queue
            .nack(&lease, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(queue.try_lease().await.unwrap().is_none());

        let again = tokio::time::timeout(Duration::from_secs(2), queue.dequeue())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.unit_id, lease.unit_id);
        assert_eq!(again.attempt(), 2);
        assert_ne!(again.token, lease.token);
    }

    #[tokio::test]
    async fn test_expired_lease_is_redelivered() {
        let (queue, job) = setup(Duration::from_millis(30)).await;
        queue.enqueue(Unit::new(job.id, "BTC")).await.unwrap();

        // Simulates a worker that crashed before resolving its unit.
        let crashed = queue.dequeue().await.unwrap();

        let again = tokio::time::timeout(Duration::from_secs(2), queue.dequeue())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.unit_id, crashed.unit_id);
        assert_eq!(again.attempt(), 2);

        assert!(matches!(
            queue.ack(&crashed).await,
            Err(QueueError::LeaseLost { .. })
        ));
        queue.ack(&again).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close_rejects_and_wakes() {
        let (queue, job) = setup(Duration::from_secs(60)).await;
        let queue = Arc::new(queue);

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(QueueError::Closed)));
        assert!(matches!(
            queue.enqueue(Unit::new(job.id, "BTC")).await,
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_enqueue_waits_off_the_runtime() {
        let (queue, job) = setup(Duration::from_secs(60)).await;

        let ticks = Arc::new(AtomicU32::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = {
            let db = queue.db.clone();
            std::thread::spawn(move || {
                db.with_conn(|_| {
                    locked_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
                .unwrap();
            })
        };
        locked_rx.recv().unwrap();

        queue.enqueue(Unit::new(job.id, "BTC")).await.unwrap();
        ticker.abort();
        holder.join().unwrap();

        // The ticker kept running while enqueue waited for the connection.
        assert!(ticks.load(Ordering::SeqCst) >= 5);
        assert_eq!(queue.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_units_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let job = Job::new();
        {
            let db = Database::open(&path).unwrap();
            SqliteResultStore::new(db.clone()).create_job(&job).await.unwrap();
            let queue = SqliteTaskQueue::new(db, Duration::from_secs(60), Duration::from_millis(5));
            queue.enqueue(Unit::new(job.id, "BTC")).await.unwrap();
            queue.enqueue(Unit::new(job.id, "ETH")).await.unwrap();
        }

        let db = Database::open(&path).unwrap();
        let queue = SqliteTaskQueue::new(db, Duration::from_secs(60), Duration::from_millis(5));
        assert_eq!(queue.pending_for_job(job.id).await.unwrap(), 2);
        assert_eq!(queue.dequeue().await.unwrap().unit.item, "BTC");
    }
}
