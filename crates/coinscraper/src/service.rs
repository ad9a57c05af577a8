use std::sync::Arc;

use log::info;
use serde_json::Value;
use uuid::Uuid;

use crate::config::{Config, Settings};
use crate::db::Database;
use crate::error::{JobError, Result};
use crate::orchestrator::JobOrchestrator;
use crate::queue::SqliteTaskQueue;
use crate::scrape::ScrapeCapability;
use crate::status::{JobView, StatusAggregator};
use crate::store::{Job, SqliteResultStore};
use crate::worker::{UnitExecutor, WorkerPool};

/// The assembled system: store, queue, worker pool, orchestrator and status
/// reader sharing one database.
pub struct ScrapeService {
    database: Database,
    queue: Arc<SqliteTaskQueue>,
    pool: WorkerPool,
    orchestrator: JobOrchestrator,
    status: StatusAggregator,
}

impl ScrapeService {
    /// Opens the configured database and starts the workers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(config: &Config, scraper: Arc<dyn ScrapeCapability>) -> Result<Self> {
        let path = config.database_path()?;
        let database = Database::open(&path)?;
        Ok(Self::with_database(database, config.settings(), scraper))
    }

    /// Read-only access for status queries. Opens the configured database
    /// without starting workers, so queued units stay where they are.
    pub fn status_reader(config: &Config) -> Result<StatusAggregator> {
        let database = Database::open(&config.database_path()?)?;
        Ok(StatusAggregator::new(Arc::new(SqliteResultStore::new(
            database,
        ))))
    }

    pub fn with_database(
        database: Database,
        settings: Settings,
        scraper: Arc<dyn ScrapeCapability>,
    ) -> Self {
        let store = Arc::new(SqliteResultStore::new(database.clone()));
        let queue = Arc::new(SqliteTaskQueue::new(
            database.clone(),
            settings.lease_timeout,
            settings.poll_interval,
        ));

        let executor = Arc::new(UnitExecutor::new(
            store.clone(),
            queue.clone(),
            scraper,
            settings.retry.clone(),
            settings.fetch_timeout,
        ));
        let pool = WorkerPool::start(executor, settings.worker_count.max(1));

        info!(
            "Scrape service started: {} workers, fetch timeout {} ms, max {} attempts",
            pool.worker_count(),
            settings.fetch_timeout.as_millis(),
            settings.retry.max_attempts
        );

        Self {
            database,
            queue: queue.clone(),
            pool,
            orchestrator: JobOrchestrator::new(store.clone(), queue),
            status: StatusAggregator::new(store),
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn queue(&self) -> &SqliteTaskQueue {
        &self.queue
    }

    pub async fn start_job(&self, items: &[String]) -> std::result::Result<Job, JobError> {
        self.orchestrator.start_job(items).await
    }

    pub async fn start_job_json(&self, body: &Value) -> std::result::Result<Job, JobError> {
        self.orchestrator.start_job_json(body).await
    }

    pub async fn get_status(&self, job_id: Uuid) -> std::result::Result<JobView, JobError> {
        self.status.get_status(job_id).await
    }

    pub async fn get_status_str(&self, job_id: &str) -> std::result::Result<JobView, JobError> {
        self.status.get_status_str(job_id).await
    }

    /// Stops accepting work and waits for in-flight units to finish.
    ///
    /// Units still queued stay in the database and are picked up by the
    /// next service opened on it.
    pub async fn shutdown(self) {
        self.queue.close();
        self.pool.wait().await;
        info!("Scrape service stopped");
    }
}
