//! Test harness for isolated service runs.
//!
//! Each `TestHarness` owns a temp directory holding the SQLite file and a
//! running `ScrapeService` over it, with timings short enough for tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use uuid::Uuid;

use coinscraper::config::Settings;
use coinscraper::{Database, JobView, RetryPolicy, ScrapeCapability, ScrapeService};

/// Settings with millisecond backoff so retry paths finish quickly.
pub fn fast_settings() -> Settings {
    Settings {
        worker_count: 4,
        fetch_timeout: Duration::from_millis(500),
        lease_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub service: ScrapeService,
}

impl TestHarness {
    /// Starts a service with [`fast_settings`].
    pub fn new(scraper: Arc<dyn ScrapeCapability>) -> Self {
        Self::with_settings(scraper, fast_settings())
    }

    pub fn with_settings(scraper: Arc<dyn ScrapeCapability>, settings: Settings) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("coinscraper.db");
        let database = Database::open(&db_path).expect("Failed to open database");
        let service = ScrapeService::with_database(database, settings, scraper);

        Self {
            temp_dir,
            db_path,
            service,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn items(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Stops the service, keeping the temp directory alive.
    pub async fn shutdown(self) -> (TempDir, PathBuf) {
        self.service.shutdown().await;
        (self.temp_dir, self.db_path)
    }
}

/// Polls until the job has at least `expected` tasks and its queue units
/// are drained, or panics after `timeout`.
pub async fn wait_for_tasks(
    service: &ScrapeService,
    job_id: Uuid,
    expected: usize,
    timeout: Duration,
) -> JobView {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let view = service
            .get_status(job_id)
            .await
            .expect("status read failed");
        let drained = service
            .queue()
            .pending_for_job(job_id)
            .await
            .expect("queue count failed")
            == 0;
        if view.task_count() >= expected && drained {
            return view;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "job {} has {} of {} tasks after {:?}",
                job_id,
                view.task_count(),
                expected,
                timeout
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
