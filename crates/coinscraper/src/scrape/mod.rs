//! The scraping capability the workers call for each item.
//!
//! The orchestration layer only relies on the contract: repeated calls for
//! the same item are safe, failures say whether retrying can help, and the
//! caller bounds every call with its own timeout.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

pub use crate::store::Output as ScrapeOutput;
pub use http::{HttpScraper, HttpScraperConfig};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Worth retrying: timeouts, throttling, temporary unavailability.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// Retrying cannot succeed: malformed or unknown item.
    #[error("permanent fetch failure: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    /// The reason without the classification prefix.
    pub fn reason(&self) -> &str {
        match self {
            FetchError::Transient(reason) | FetchError::Permanent(reason) => reason,
        }
    }
}

#[async_trait]
pub trait ScrapeCapability: Send + Sync {
    /// Fetches the structured result for one item.
    async fn fetch(&self, item: &str) -> Result<ScrapeOutput, FetchError>;
}
