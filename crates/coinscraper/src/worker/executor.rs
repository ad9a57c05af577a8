use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info_span, warn, Instrument};

use crate::error::WorkerError;
use crate::queue::{Lease, QueueError, TaskQueue};
use crate::scrape::{FetchError, ScrapeCapability};
use crate::store::{NewTask, ResultStore};
use crate::worker::retry::RetryPolicy;

/// How a leased unit was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Scraped and persisted.
    Completed,
    /// Persisted with a failure marker.
    Failed { reason: String },
    /// Handed back to the queue for another delivery.
    Retrying { delay: Duration, reason: String },
    /// Neither persisted nor handed back; the lease will expire and the
    /// queue redelivers the unit.
    Abandoned { reason: String },
    /// Removed from the queue without a persisted row after the store kept
    /// rejecting it for every allowed attempt.
    Dropped { reason: String },
}

/// Runs the execution contract for one unit: fetch, persist, then ack, or
/// hand the unit back for a retry.
pub struct UnitExecutor {
    store: Arc<dyn ResultStore>,
    queue: Arc<dyn TaskQueue>,
    scraper: Arc<dyn ScrapeCapability>,
    policy: RetryPolicy,
    fetch_timeout: Duration,
}

impl UnitExecutor {
    pub fn new(
        store: Arc<dyn ResultStore>,
        queue: Arc<dyn TaskQueue>,
        scraper: Arc<dyn ScrapeCapability>,
        policy: RetryPolicy,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            scraper,
            policy,
            fetch_timeout,
        }
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    pub async fn execute(&self, lease: Lease) -> UnitOutcome {
        let span = info_span!(
            "execute_unit",
            job_id = %lease.unit.job_id,
            item = %lease.unit.item,
            attempt = lease.attempt(),
        );
        self.execute_inner(lease).instrument(span).await
    }

    async fn execute_inner(&self, lease: Lease) -> UnitOutcome {
        let attempt = lease.attempt();
        let fetched = match tokio::time::timeout(
            self.fetch_timeout,
            self.scraper.fetch(&lease.unit.item),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Transient(format!(
                "fetch timed out after {} ms",
                self.fetch_timeout.as_millis()
            ))),
        };

        let task = match fetched {
            Ok(output) => NewTask::success(lease.unit.job_id, lease.unit.item.clone(), output),
            Err(e) if e.is_transient() && self.policy.should_retry(attempt) => {
                let delay = self.policy.delay_for(attempt);
                debug!("{}, retrying in {} ms", e, delay.as_millis());
                return self
                    .hand_back(&lease, delay, e.reason().to_string())
                    .await;
            }
            Err(e) if e.is_transient() => {
                warn!("Giving up after {} attempts: {}", attempt, e);
                NewTask::failure(
                    lease.unit.job_id,
                    lease.unit.item.clone(),
                    format!("gave up after {} attempts: {}", attempt, e.reason()),
                )
            }
            Err(e) => {
                warn!("{}", e);
                NewTask::failure(lease.unit.job_id, lease.unit.item.clone(), e.reason())
            }
        };

        if let Err(e) = self.store.insert_task(&task).await {
            let err = WorkerError::from(e);
            if self.policy.should_retry(attempt) {
                warn!("Failed to persist task: {}", err);
                let delay = self.policy.delay_for(attempt);
                return self.hand_back(&lease, delay, err.to_string()).await;
            }
            return self.give_up_unpersisted(&lease, attempt, err).await;
        }

        self.resolve(&lease).await;

        match task.output.get(crate::store::FAILURE_KEY) {
            Some(reason) => UnitOutcome::Failed {
                reason: reason.as_str().unwrap_or_default().to_string(),
            },
            None => {
                debug!("Unit completed");
                UnitOutcome::Completed
            }
        }
    }

    async fn resolve(&self, lease: &Lease) {
        match self.queue.ack(lease).await {
            Ok(()) => {}
            Err(QueueError::LeaseLost { unit_id }) => {
                // Another delivery of this unit may persist a duplicate row.
                warn!("Lease on unit {} lost before ack", unit_id);
            }
            Err(e) => warn!("Failed to ack unit {}: {}", lease.unit_id, e),
        }
    }

    /// The store rejected the row on the last allowed attempt. One failure
    /// marker is tried; the unit leaves the queue either way so the scraper
    /// is not called again.
    async fn give_up_unpersisted(
        &self,
        lease: &Lease,
        attempt: u32,
        err: WorkerError,
    ) -> UnitOutcome {
        let reason = format!("gave up after {} attempts: {}", attempt, err);
        let marker = NewTask::failure(lease.unit.job_id, lease.unit.item.clone(), reason.clone());
        let outcome = match self.store.insert_task(&marker).await {
            Ok(_) => {
                warn!("Persisting result failed, recorded failure: {}", err);
                UnitOutcome::Failed { reason }
            }
            Err(e) => {
                error!(
                    "Dropping unit {} for item {}: {}; marker not persisted: {}",
                    lease.unit_id,
                    lease.unit.item,
                    reason,
                    WorkerError::from(e)
                );
                UnitOutcome::Dropped { reason }
            }
        };
        self.resolve(lease).await;
        outcome
    }

    async fn hand_back(&self, lease: &Lease, delay: Duration, reason: String) -> UnitOutcome {
        match self.queue.nack(lease, delay).await {
            Ok(()) => UnitOutcome::Retrying { delay, reason },
            Err(e) => {
                let err = WorkerError::from(e);
                warn!("Failed to return unit {}: {}", lease.unit_id, err);
                UnitOutcome::Abandoned {
                    reason: format!("{}; {}", reason, err),
                }
            }
        }
    }
}
