//! Command-line front end: start a scrape job or read a job's status.
//!
//! Prints the job view as JSON on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use coinscraper::logging::{self, LogFormat};
use coinscraper::{load_config, Config, HttpScraper, JobView, ScrapeService};

#[derive(Parser)]
#[command(name = "coinscraper")]
#[command(about = "Scrape coin pages as a batch job")]
struct Cli {
    /// Config file (JSON). Built-in defaults are used when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Wait until every requested coin has its own result before printing.
    #[arg(long)]
    wait: bool,

    /// Give up waiting after this many seconds.
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Print the status of an existing job instead of starting one.
    #[arg(long, conflicts_with_all = ["coins", "wait"])]
    status: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Coin identifiers, e.g. bitcoin ethereum.
    #[arg(required_unless_present = "status")]
    coins: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    logging::init(&config.log_level, format)?;

    let view = match &cli.status {
        Some(job_id) => {
            ScrapeService::status_reader(&config)?
                .get_status_str(job_id)
                .await?
        }
        None => {
            let scraper = HttpScraper::new(config.scraper.to_http_config())
                .context("Failed to build HTTP client")?;
            let service = ScrapeService::start(&config, Arc::new(scraper))?;

            let outcome = run(&cli, &service).await;
            service.shutdown().await;
            outcome?
        }
    };

    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

async fn run(cli: &Cli, service: &ScrapeService) -> Result<JobView> {
    let job = service.start_job(&cli.coins).await?;
    tracing::info!("Started job {}", job.id);

    if !cli.wait {
        return Ok(service.get_status(job.id).await?);
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(cli.timeout_secs);
    loop {
        let view = service.get_status(job.id).await?;
        if view.is_complete(&cli.coins) {
            return Ok(view);
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(
                "Timed out with {} results for {} coins",
                view.task_count(),
                cli.coins.len()
            );
            return Ok(view);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}
