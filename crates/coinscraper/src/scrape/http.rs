//! HTTP scraper fetching a coin's public page.
//!
//! Only the page title is extracted; richer extraction plugs in behind
//! [`ScrapeCapability`].

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::Value;

use super::{FetchError, ScrapeCapability, ScrapeOutput};

pub const DEFAULT_BASE_URL: &str = "https://coinmarketcap.com/currencies/{}/";

#[derive(Debug, Clone)]
pub struct HttpScraperConfig {
    /// URL template; `{}` is replaced by the lower-cased item.
    pub base_url: String,
    pub user_agent: String,
}

impl Default for HttpScraperConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: format!("coinscraper/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub struct HttpScraper {
    client: reqwest::Client,
    config: HttpScraperConfig,
}

impl HttpScraper {
    pub fn new(config: HttpScraperConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    /// Builds the page URL for an item, rejecting items that cannot name a
    /// page.
    pub fn coin_url(&self, item: &str) -> Result<String, FetchError> {
        let slug = coin_slug(item)?;
        Ok(self.config.base_url.replace("{}", &slug))
    }
}

fn coin_slug(item: &str) -> Result<String, FetchError> {
    if item.is_empty() {
        return Err(FetchError::Permanent("empty coin identifier".to_string()));
    }
    if let Some(bad) = item
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(FetchError::Permanent(format!(
            "invalid character {:?} in coin identifier '{}'",
            bad, item
        )));
    }
    Ok(item.to_ascii_lowercase())
}

/// Maps a non-success HTTP status to a failure class.
fn classify_status(status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }
    let reason = format!("HTTP {}", status);
    let transient = status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT;
    Some(if transient {
        FetchError::Transient(reason)
    } else {
        FetchError::Permanent(reason)
    })
}

fn classify_transport(err: reqwest::Error) -> FetchError {
    if err.is_builder() {
        FetchError::Permanent(err.to_string())
    } else {
        FetchError::Transient(err.to_string())
    }
}

fn extract_title(html: &str) -> Option<String> {
    static TITLE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = TITLE
        .get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok())
        .as_ref()?;
    let title = re.captures(html)?.get(1)?.as_str().trim();
    if title.is_empty() {
        None
    } else {
        Some(title.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

#[async_trait]
impl ScrapeCapability for HttpScraper {
    async fn fetch(&self, item: &str) -> Result<ScrapeOutput, FetchError> {
        let url = self.coin_url(item)?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if let Some(err) = classify_status(status) {
            return Err(err);
        }
        let body = response.text().await.map_err(classify_transport)?;

        let mut output = ScrapeOutput::new();
        output.insert("coin".to_string(), Value::String(item.to_string()));
        output.insert("url".to_string(), Value::String(url));
        output.insert("status".to_string(), Value::from(status.as_u16()));
        output.insert(
            "title".to_string(),
            extract_title(&body).map(Value::String).unwrap_or(Value::Null),
        );
        Ok(output)
    }
}
