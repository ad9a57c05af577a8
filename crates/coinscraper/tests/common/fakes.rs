//! Scripted scrapers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use coinscraper::{FetchError, ScrapeCapability, ScrapeOutput};
use serde_json::json;

fn coin_output(item: &str) -> ScrapeOutput {
    let mut out = ScrapeOutput::new();
    out.insert("coin".to_string(), json!(item));
    out.insert("price".to_string(), json!(42.0));
    out
}

/// Call counter shared by every fake.
#[derive(Default)]
pub struct Calls {
    total: AtomicU32,
    per_item: Mutex<HashMap<String, u32>>,
}

impl Calls {
    /// Records a call and returns how many times `item` has been fetched,
    /// this call included.
    fn record(&self, item: &str) -> u32 {
        self.total.fetch_add(1, Ordering::SeqCst);
        let mut per_item = self.per_item.lock().unwrap();
        let n = per_item.entry(item.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    pub fn total(&self) -> u32 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn for_item(&self, item: &str) -> u32 {
        self.per_item
            .lock()
            .unwrap()
            .get(item)
            .copied()
            .unwrap_or(0)
    }
}

/// Succeeds for every item, optionally after a short per-item jitter.
#[derive(Default)]
pub struct AlwaysSucceed {
    pub calls: Calls,
    pub jitter: bool,
}

impl AlwaysSucceed {
    pub fn with_jitter() -> Self {
        Self {
            jitter: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ScrapeCapability for AlwaysSucceed {
    async fn fetch(&self, item: &str) -> Result<ScrapeOutput, FetchError> {
        self.calls.record(item);
        if self.jitter {
            let ms = item.bytes().map(u64::from).sum::<u64>() % 15;
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        Ok(coin_output(item))
    }
}

/// Fails every call with a retryable error.
#[derive(Default)]
pub struct AlwaysTransient {
    pub calls: Calls,
}

#[async_trait]
impl ScrapeCapability for AlwaysTransient {
    async fn fetch(&self, item: &str) -> Result<ScrapeOutput, FetchError> {
        self.calls.record(item);
        Err(FetchError::Transient("HTTP 503 Service Unavailable".to_string()))
    }
}

/// Permanently fails the listed items and succeeds for the rest.
pub struct PermanentFor {
    pub calls: Calls,
    unknown: HashSet<String>,
}

impl PermanentFor {
    pub fn new(items: &[&str]) -> Self {
        Self {
            calls: Calls::default(),
            unknown: items.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ScrapeCapability for PermanentFor {
    async fn fetch(&self, item: &str) -> Result<ScrapeOutput, FetchError> {
        self.calls.record(item);
        if self.unknown.contains(item) {
            return Err(FetchError::Permanent(format!("unknown coin '{}'", item)));
        }
        Ok(coin_output(item))
    }
}

/// Fails the first `failures` fetches of each item transiently, then
/// succeeds.
pub struct FlakyThenSucceed {
    pub calls: Calls,
    failures: u32,
}

impl FlakyThenSucceed {
    pub fn new(failures: u32) -> Self {
        Self {
            calls: Calls::default(),
            failures,
        }
    }
}

#[async_trait]
impl ScrapeCapability for FlakyThenSucceed {
    async fn fetch(&self, item: &str) -> Result<ScrapeOutput, FetchError> {
        let n = self.calls.record(item);
        if n <= self.failures {
            return Err(FetchError::Transient(format!("flaky call {}", n)));
        }
        Ok(coin_output(item))
    }
}

/// Takes `delay` before succeeding.
pub struct Slow {
    pub calls: Calls,
    delay: Duration,
}

impl Slow {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: Calls::default(),
            delay,
        }
    }
}

#[async_trait]
impl ScrapeCapability for Slow {
    async fn fetch(&self, item: &str) -> Result<ScrapeOutput, FetchError> {
        self.calls.record(item);
        tokio::time::sleep(self.delay).await;
        Ok(coin_output(item))
    }
}
