pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod queue;
pub mod scrape;
pub mod service;
pub mod status;
pub mod store;
pub mod worker;

pub use config::{load_config, load_config_from_str, Config, Settings};
pub use db::{Database, DatabaseError};
pub use error::{CoinScraperError, ConfigError, JobError, Result, WorkerError};
pub use orchestrator::JobOrchestrator;
pub use queue::{Lease, QueueError, SqliteTaskQueue, TaskQueue, Unit};
pub use scrape::{FetchError, HttpScraper, HttpScraperConfig, ScrapeCapability, ScrapeOutput};
pub use service::ScrapeService;
pub use status::{JobView, StatusAggregator, TaskView};
pub use store::{Job, NewTask, ResultStore, SqliteResultStore, StoreError, Task};
pub use worker::{RetryPolicy, UnitExecutor, UnitOutcome, WorkerPool};
